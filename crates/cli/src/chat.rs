//! Line-oriented interactive session over stdin.

use anyhow::Context;
use precis_core::{Outcome, PromptUpdate, Session};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::echo;

/// Terminates a multi-line prompt text.
const END_OF_TEXT: &str = ".";

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Help,
    Prompts,
    Use(String),
    AddPrompt(String),
    EditPrompt(String),
    RemovePrompt(String),
    AddWord(String),
    Words(Option<String>),
    ClearWords,
    History,
    Quit,
    Article(String),
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim_start();
    if !line.starts_with('/') {
        return Input::Article(line.trim().to_string());
    }

    let (command, rest) = line.split_once(' ').unwrap_or((line.trim_end(), ""));
    let arg = rest.trim().to_string();
    match command {
        "/help" | "/?" => Input::Help,
        "/prompts" => Input::Prompts,
        "/use" => Input::Use(arg),
        "/add-prompt" => Input::AddPrompt(arg),
        "/edit-prompt" => Input::EditPrompt(arg),
        "/remove-prompt" => Input::RemovePrompt(arg),
        "/add-word" => Input::AddWord(arg),
        "/words" if arg.is_empty() => Input::Words(None),
        "/words" => Input::Words(Some(arg)),
        "/clear-words" => Input::ClearWords,
        "/history" => Input::History,
        "/quit" | "/exit" => Input::Quit,
        _ => Input::Unknown(command.to_string()),
    }
}

/// Read lines until [`END_OF_TEXT`] or end of input.
async fn read_text<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>) -> anyhow::Result<String> {
    let mut text = Vec::new();
    while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
        if line.trim() == END_OF_TEXT {
            break;
        }
        text.push(line);
    }
    Ok(text.join("\n"))
}

fn flush_warnings(session: &mut Session) {
    for warning in session.take_warnings() {
        echo::print_warning(&warning);
    }
}

fn report_outcome(outcome: Outcome) {
    match outcome {
        Outcome::Answered(answer) => println!("{answer}"),
        Outcome::InvalidUrl => echo::print_warning("That is not a URL or a command. Type /help for commands."),
        Outcome::NoPrompt => echo::print_warning("No prompt selected. Add one with /add-prompt <name>."),
        Outcome::NoText => echo::print_error("Could not read any text from that page."),
        Outcome::NoAnswer => echo::print_error("None of the models produced an answer. Try again later."),
    }
}

/// Run the session until `/quit` or end of input.
pub async fn run(mut session: Session) -> anyhow::Result<()> {
    echo::print_banner();
    if let Some(greeting) = session.transcript().first() {
        echo::print_message(greeting);
    }
    echo::print_help();
    flush_warnings(&mut session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let result = match parse_input(&line) {
            Input::Help => {
                echo::print_help();
                Ok(())
            }
            Input::Prompts => {
                echo::print_prompts(session.profile(), session.selected_prompt());
                Ok(())
            }
            Input::Use(name) => session
                .select_prompt(&name)
                .map(|()| echo::print_success(&format!("Using prompt '{name}'"))),
            Input::AddPrompt(name) => {
                echo::print_info(&format!("Enter the text for '{name}', then a line with only '{END_OF_TEXT}'"));
                let text = read_text(&mut lines).await?;
                session
                    .add_prompt(&name, &text)
                    .await
                    .map(|()| echo::print_success(&format!("Added prompt '{}'", name.trim())))
            }
            Input::EditPrompt(name) => {
                echo::print_info(&format!(
                    "Enter the new text for '{name}', then a line with only '{END_OF_TEXT}'. Empty text deletes it."
                ));
                let text = read_text(&mut lines).await?;
                session.update_prompt(&name, &text).await.map(|update| match update {
                    PromptUpdate::Updated => echo::print_success(&format!("Updated prompt '{name}'")),
                    PromptUpdate::Deleted => echo::print_success(&format!("Deleted prompt '{name}'")),
                })
            }
            Input::RemovePrompt(name) => session
                .remove_prompt(&name)
                .await
                .map(|()| echo::print_success(&format!("Deleted prompt '{name}'"))),
            Input::AddWord(word) => session
                .add_filter_word(&word)
                .await
                .map(|()| echo::print_success(&format!("Added filter word {word:?}"))),
            Input::Words(None) => {
                echo::print_filter_words(session.profile());
                Ok(())
            }
            Input::Words(Some(json)) => session
                .replace_filter_words(&json)
                .await
                .map(|()| echo::print_filter_words(session.profile())),
            Input::ClearWords => session
                .replace_filter_words("")
                .await
                .map(|()| echo::print_success("Cleared filter words")),
            Input::History => {
                session.transcript().iter().for_each(echo::print_message);
                Ok(())
            }
            Input::Quit => break,
            Input::Article(url) => {
                echo::print_info(&format!("Processing {url}"));
                report_outcome(session.process_article(&url).await);
                Ok(())
            }
            Input::Unknown(command) => {
                echo::print_warning(&format!("Unknown command {command}. Type /help for commands."));
                Ok(())
            }
        };

        if let Err(e) = result {
            echo::print_error(&e.to_string());
        }
        flush_warnings(&mut session);
    }

    let profile = session.end();
    echo::print_info(&format!(
        "Session closed with {} prompts and {} filter words.",
        profile.prompts.len(),
        profile.filter_words.len()
    ));
    Ok(())
}
