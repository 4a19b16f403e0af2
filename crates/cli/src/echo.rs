use owo_colors::OwoColorize;
use precis_core::{Message, Profile, Role};

use crate::VERSION;

/// Print a styled banner for interactive sessions
pub fn print_banner() {
    eprintln!("\n{} {} {}", "Precis".bold().bright_blue(), "v".dimmed(), VERSION.dimmed());
    eprintln!("{}", "Summarize web articles with your own prompts\n".dimmed());
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message.bright_blue());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.bright_red());
}

/// Print one transcript entry
pub fn print_message(message: &Message) {
    match message.role {
        Role::User => println!("{} {}", "you>".bold().cyan(), message.content),
        Role::Assistant => println!("{} {}", "precis>".bold().bright_blue(), message.content),
        Role::System => println!("{} {}", "system>".dimmed(), message.content.dimmed()),
    }
}

/// Print the stored prompts, marking the selected one
pub fn print_prompts(profile: &Profile, selected: Option<&str>) {
    if profile.prompts.is_empty() {
        print_info("No prompts yet. Add one with /add-prompt <name>.");
        return;
    }

    println!("{}", "Prompts".bold().cyan());
    for prompt in &profile.prompts {
        let marker = if Some(prompt.name.as_str()) == selected { "●" } else { "○" };
        println!("  {} {}", marker.green(), prompt.name.bright_white());
        for line in prompt.instruction.lines() {
            println!("      {}", line.dimmed());
        }
    }
}

/// Print the filter word list as JSON
pub fn print_filter_words(profile: &Profile) {
    println!("{} {}", "Filter words:".bold().cyan(), profile.filter_words_json());
}

pub fn print_help() {
    let commands = [
        ("<URL>", "process an article with the selected prompt"),
        ("/prompts", "list prompts"),
        ("/use <name>", "select a prompt"),
        ("/add-prompt <name>", "add a prompt; its text follows, ending with a line holding only '.'"),
        ("/edit-prompt <name>", "replace a prompt's text; empty text deletes it"),
        ("/remove-prompt <name>", "delete a prompt"),
        ("/add-word <text>", "strip <text> from every answer"),
        ("/words [json]", "show the filter words, or replace them with a JSON list"),
        ("/clear-words", "remove every filter word"),
        ("/history", "show this session's messages"),
        ("/quit", "end the session"),
    ];

    eprintln!("{}", "Commands".bold().cyan());
    for (command, description) in commands {
        eprintln!("  {:<24} {}", command.bright_white(), description.dimmed());
    }
}
