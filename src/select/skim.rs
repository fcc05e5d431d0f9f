use std::io;

use skim::prelude::{SkimItemReader, SkimOptionsBuilder};
use skim::Skim;

use crate::select::{Choice, Select};

pub struct SkimSelector;

impl Select for SkimSelector {
    fn select<'a, T: Choice>(&self, prompt: &str, items: &'a [T]) -> anyhow::Result<Option<&'a T>> {
        let labels = items.iter().map(|item| item.label()).collect::<Vec<_>>();

        let item_reader = SkimItemReader::default();
        let skim_items = item_reader.of_bufread(io::Cursor::new(labels.join("\n")));

        let prompt = format!("{}> ", prompt);
        let options = SkimOptionsBuilder::default()
            .reverse(true)
            .prompt(Some(prompt.as_str()))
            .build()?;
        let selected = Skim::run_with(&options, Some(skim_items))
            .and_then(|out| (!out.is_abort).then_some(out.selected_items))
            .unwrap_or_default();

        let selected_label = selected.into_iter().next().map(|x| x.output().to_string());
        Ok(selected_label.and_then(|label| {
            labels
                .iter()
                .position(|l| *l == label)
                .and_then(|i| items.get(i))
        }))
    }
}
