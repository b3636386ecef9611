use crate::output::{print_json, print_table};
use std::path::Path;

pub fn run(root: &Path, config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root, config)?;
    let catalog = config.catalog();

    if json {
        let tasks: Vec<_> = catalog.iter().collect();
        return print_json(&tasks);
    }

    if catalog.is_empty() {
        println!("No tasks.");
        return Ok(());
    }

    let rows = catalog
        .iter()
        .map(|t| {
            let requires: Vec<&str> = t.required_signals.iter().map(|s| s.as_str()).collect();
            vec![
                t.id.clone(),
                t.display_name.clone(),
                or_dash(requires.join(", ")),
                or_dash(t.dependencies.join(", ")),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "REQUIRES", "DEPENDS ON"], rows);
    Ok(())
}

fn or_dash(s: String) -> String {
    if s.is_empty() {
        "-".to_string()
    } else {
        s
    }
}
