use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use xformcase::parser::{archive_forms, load_form};
use xformcase::{CaseActionModel, QuestionOptions};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect XForms and synthesize case management XML", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the questions of a form as JSON
    Questions {
        /// Form XML file, or `app.ccz!path/inside.xml`
        #[arg(value_name = "FORM")]
        form: String,
        /// Label languages in order of preference
        #[arg(long = "lang")]
        langs: Vec<String>,
        #[arg(long)]
        include_triggers: bool,
        #[arg(long)]
        include_groups: bool,
        #[arg(long)]
        include_translations: bool,
        #[arg(long)]
        exclude_select_with_itemsets: bool,
        #[arg(long)]
        include_fixtures: bool,
    },
    /// Write case blocks and meta into a form and print the result
    Synthesize {
        #[arg(value_name = "FORM")]
        form: String,
        /// JSON case action model
        #[arg(value_name = "ACTIONS_JSON")]
        actions: Utf8PathBuf,
        /// Treat the actions as an advanced module's
        #[arg(long)]
        advanced: bool,
        /// Also print the case property usage report to stderr
        #[arg(long)]
        report: bool,
    },
    /// Parse every `*.xml` form under a directory, including the forms
    /// inside `*.ccz` archives
    Batch {
        #[arg(value_name = "DIR")]
        dir: Utf8PathBuf,
    },
}

#[derive(Serialize, Debug)]
struct FormSummary {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    questions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    languages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn summarize(path: &str) -> FormSummary {
    let result = load_form(path).and_then(|form| {
        let questions = form.get_questions(&[], &QuestionOptions::default())?;
        Ok((questions.len(), form.get_languages()))
    });
    match result {
        Ok((count, languages)) => FormSummary {
            path: path.to_string(),
            questions: Some(count),
            languages: Some(languages),
            error: None,
        },
        Err(e) => FormSummary {
            path: path.to_string(),
            questions: None,
            languages: None,
            error: Some(format!("{:#}", e)),
        },
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Questions {
            form,
            langs,
            include_triggers,
            include_groups,
            include_translations,
            exclude_select_with_itemsets,
            include_fixtures,
        } => {
            let xform = load_form(&form)?;
            let opts = QuestionOptions {
                include_triggers,
                include_groups,
                include_translations,
                exclude_select_with_itemsets,
                include_fixtures,
            };
            let langs: Vec<&str> = langs.iter().map(String::as_str).collect();
            let questions = xform
                .get_questions(&langs, &opts)
                .with_context(|| format!("Failed to list questions of {}", form))?;
            println!("{}", serde_json::to_string_pretty(&questions)?);
        }
        Command::Synthesize {
            form,
            actions,
            advanced,
            report,
        } => {
            let mut xform = load_form(&form)?;
            let text = std::fs::read_to_string(&actions)
                .with_context(|| format!("Failed to read {}", actions))?;
            let model: CaseActionModel = serde_json::from_str(&text)
                .with_context(|| format!("Invalid case action model in {}", actions))?;
            if report {
                let usage = xform.case_property_usage(&model);
                eprintln!("{}", serde_json::to_string_pretty(&usage)?);
            }
            if advanced {
                xform.add_case_and_meta_advanced(&model)
            } else {
                xform.add_case_and_meta(&model)
            }
            .with_context(|| format!("Failed to add case blocks to {}", form))?;
            print!("{}", xform.render_string());
        }
        Command::Batch { dir } => {
            let mut paths: Vec<String> = Vec::new();
            for entry in walkdir::WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Some(path) = Utf8Path::from_path(entry.path()) else {
                    continue;
                };
                match path.extension() {
                    Some("xml") => paths.push(path.to_string()),
                    Some("ccz") => paths.extend(
                        archive_forms(path).with_context(|| format!("Failed to list {}", path))?,
                    ),
                    _ => {}
                }
            }
            log::info!("{} forms under {}", paths.len(), dir);
            let summaries: Vec<FormSummary> = paths.par_iter().map(|p| summarize(p)).collect();
            for summary in summaries {
                println!("{}", serde_json::to_string(&summary)?);
            }
        }
    }
    Ok(())
}
