use crate::assume_role::{Account, Role};
use crate::function::FunctionDescriptor;

pub mod skim;

/// Something that can be picked from a list.
pub trait Choice {
    /// The value a user types on the command line to pick this item.
    fn key(&self) -> &str;

    /// The line shown in an interactive picker.
    fn label(&self) -> String {
        self.key().to_string()
    }
}

impl Choice for Account {
    fn key(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        format!("{} {}", self.id, self.name)
    }
}

impl Choice for Role {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Choice for FunctionDescriptor {
    fn key(&self) -> &str {
        &self.name
    }
}

pub trait Select {
    fn select<'a, T: Choice>(&self, prompt: &str, items: &'a [T]) -> anyhow::Result<Option<&'a T>>;
}

/// Picks the only item without asking, otherwise defers to `inner`.
pub struct SingleOr<S> {
    inner: S,
}

impl<S> SingleOr<S> {
    pub fn new(inner: S) -> Self {
        SingleOr { inner }
    }
}

impl<S: Select> Select for SingleOr<S> {
    fn select<'a, T: Choice>(&self, prompt: &str, items: &'a [T]) -> anyhow::Result<Option<&'a T>> {
        match items {
            [only] => Ok(Some(only)),
            _ => self.inner.select(prompt, items),
        }
    }
}
