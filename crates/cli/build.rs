use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let global = |arg: clap::Arg| arg.global(true);
    let url = || clap::arg!(<URL> "Article URL");

    let mut cmd = clap::Command::new("precis")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Precis Contributors")
        .about("Summarize web articles through a chain of LLM providers")
        .arg(global(
            clap::arg!(-c --config <FILE> "Configuration file (default: <config dir>/precis/config.toml)")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        ))
        .arg(global(clap::arg!(-u --user <NAME> "Whose profile to load and save")))
        .arg(global(clap::arg!(-a --assistant <NAME> "Assistant used to process articles")))
        .arg(global(clap::arg!(-v --verbose "Enable debug logging")))
        .subcommand(clap::Command::new("chat").about("Start an interactive session (the default)"))
        .subcommand(
            clap::Command::new("process")
                .about("Process one article with a stored prompt and print the answer")
                .arg(url())
                .arg(clap::arg!(-p --prompt <NAME> "Prompt to use (default: the first stored prompt)")),
        )
        .subcommand(clap::Command::new("fetch").about("Scrape an article and print its cleaned text").arg(url()))
        .subcommand(clap::Command::new("profile").about("Show the stored prompts and filter words"))
        .subcommand(
            clap::Command::new("completions")
                .about("Generate a shell completion script")
                .arg(clap::arg!(<SHELL> "Target shell").value_parser(["bash", "zsh", "fish", "powershell", "elvish"])),
        );

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "precis", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "precis", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "precis", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "precis", &completions_dir).unwrap();

    println!(
        "cargo:warning=Shell completions generated in: {}",
        completions_dir.display()
    );
}
