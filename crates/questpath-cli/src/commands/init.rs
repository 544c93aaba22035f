//! The `questpath init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    let config_path = Path::new("questpath.toml");
    if config_path.exists() {
        println!("questpath.toml already exists, skipping.");
    } else {
        std::fs::write(config_path, questpath_store::config::default_config_toml())
            .context("failed to write questpath.toml")?;
        println!("Created questpath.toml");
    }

    let curricula_dir = Path::new("curricula");
    std::fs::create_dir_all(curricula_dir).context("failed to create curricula directory")?;

    let example_path = curricula_dir.join("example.toml");
    if example_path.exists() {
        println!("curricula/example.toml already exists, skipping.");
    } else {
        std::fs::write(&example_path, EXAMPLE_CURRICULUM)
            .context("failed to write example curriculum")?;
        println!("Created curricula/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit curricula/example.toml or add your own subject files");
    println!("  2. Run: questpath validate");
    println!("  3. Run: questpath nodes --user you --subject example");
    println!("  4. Run: questpath quiz --user you --subject example --node greetings");

    Ok(())
}

const EXAMPLE_CURRICULUM: &str = r#"[subject]
id = "example"
name = "Example Subject"
description = "A tiny subject to show the curriculum format"

[[nodes]]
id = "greetings"
name = "Greetings"
tier = "beginner"
section = "Basics"
description = "Say hello in a few ways"

[[nodes.questions]]
id = "hello-choice"
type = "single_choice"
prompt = "Which word is a greeting?"
options = ["hello", "table", "seven"]
correct = "hello"
explanation = "\"hello\" is the most common English greeting."

[[nodes.questions]]
id = "hello-count"
type = "numeric"
prompt = "How many letters are in the word \"hello\"?"
value = 5

[[nodes.questions]]
id = "hello-multi"
type = "multiple_choice"
prompt = "Select every greeting."
options = ["hi", "hey", "chair"]
correct = ["hi", "hey"]

[[nodes]]
id = "farewells"
name = "Farewells"
tier = "beginner"
kind = "milestone"
section = "Basics"
description = "Say goodbye"
prerequisites = ["greetings"]

[[nodes.questions]]
id = "bye-match"
type = "matching_pairs"
prompt = "Match each farewell to its language."
pairs = [
    { left = "goodbye", right = "English" },
    { left = "adios", right = "Spanish" },
]

[[nodes.questions]]
id = "bye-code"
type = "code_completion"
language = "python"
prompt = "Write `farewell(name)` returning \"bye, <name>\"."
template = "def farewell(name):\n    ...\n"

[[nodes.questions.tests]]
name = "simple"
body = "assert farewell('ana') == 'bye, ana'"
"#;
