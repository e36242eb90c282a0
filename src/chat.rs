// Terminal chat frontend: the same turn driver as the web UI, printed to
// stdout chunk by chunk. `exit` or `quit` leaves the session.

use std::io::Write;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::interaction_log::InteractionLog;
use crate::session::Session;

pub async fn run_chat(config: &Config, catalog: &Catalog) -> Result<()> {
    info!("Starting terminal chat session");
    let log = InteractionLog::new(config.log_path.clone());
    let mut session = Session::new(config, catalog, log);

    println!("Bot: {}", session.greeting());
    println!("(type 'exit' or 'quit' to leave)");

    loop {
        print!("You: ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("Exiting chat...");
            break;
        }

        print!("Bot: ");
        std::io::stdout().flush()?;
        match run_terminal_turn(&mut session, input).await {
            Ok(_) => println!(),
            Err(e) => {
                println!();
                eprintln!("An error occurred: {e:#}");
            }
        }
    }
    Ok(())
}

// Stream chunks to stdout while the turn runs.
async fn run_terminal_turn(session: &mut Session, input: &str) -> Result<String> {
    let (tx, mut rx) = mpsc::channel::<String>(32);
    let result = {
        let turn = session.run_turn(input, &tx);
        tokio::pin!(turn);
        loop {
            tokio::select! {
                res = &mut turn => break res,
                Some(chunk) = rx.recv() => {
                    print!("{chunk}");
                    std::io::stdout().flush()?;
                }
            }
        }
    };
    drop(tx);
    while let Ok(chunk) = rx.try_recv() {
        print!("{chunk}");
        std::io::stdout().flush()?;
    }
    result
}
