//! Interactive REPL.

use crate::commands::{format_result, open_session};
use crate::Credentials;
use colored::Colorize;
use doquedb_client::{DataSource, Session};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

const HELP_TEXT: &str = r#"
Enter SQL terminated by ';'. Statements may span several lines.

Meta commands:
  \h, \?        Show this help
  \status       Show session and pool statistics
  \version      Show the server product version
  \q            Exit the REPL
"#;

pub fn run(
    ds: &DataSource,
    database: &str,
    credentials: Option<Credentials>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "DoqueDB CLI".bold().cyan());
    println!("Connecting to {}...", ds.config().addr());

    ds.open()?;
    let session = open_session(ds, database, credentials.as_ref())?;
    println!(
        "{} (database: {}, protocol {})",
        "Connected!".green(),
        database.cyan(),
        ds.master_id()
    );

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = home::home_dir()
        .map(|h| h.join(".doquedb_history"))
        .unwrap_or_else(|| ".doquedb_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type '\\h' for help.\n");

    let mut pending = String::new();
    loop {
        let prompt = if pending.is_empty() {
            format!("{} ", format!("{}=>", database).cyan())
        } else {
            format!("{} ", format!("{}->", database).cyan())
        };
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if pending.is_empty() && line.starts_with('\\') {
                    match meta_command(ds, &session, line) {
                        Some(output) => println!("{}\n", output),
                        None => break, // Exit command
                    }
                    continue;
                }

                if !pending.is_empty() {
                    pending.push('\n');
                }
                pending.push_str(line);
                if let Some(sql) = pending.strip_suffix(';') {
                    let sql = sql.trim().to_string();
                    pending.clear();
                    if sql.is_empty() {
                        continue;
                    }
                    match execute_sql(&session, &sql) {
                        Ok(output) => println!("{}\n", output),
                        Err(e) => println!("{}: {}\n", "Error".red(), e),
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                pending.clear();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    // Disconnect
    session.close();
    ds.close();
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

fn execute_sql(session: &Session, sql: &str) -> Result<String, Box<dyn std::error::Error>> {
    let mut rs = session.execute_statement(sql, &[])?;
    Ok(format_result(&mut rs)?)
}

/// Runs a backslash command. `None` means exit.
fn meta_command(ds: &DataSource, session: &Session, line: &str) -> Option<String> {
    let cmd = line.split_whitespace().next().unwrap_or(line);
    let output = match cmd {
        "\\q" | "\\quit" => return None,
        "\\h" | "\\?" | "\\help" => HELP_TEXT.to_string(),
        "\\status" => format_status(ds, session),
        "\\version" => match session.query_product_version() {
            Ok(version) => version.cyan().to_string(),
            Err(e) => format!("{}: {}", "Error".red(), e),
        },
        _ => format!("Unknown command: {}. Type '\\h' for help.", cmd),
    };
    Some(output)
}

fn format_status(ds: &DataSource, session: &Session) -> String {
    let stats = ds.stats();
    let mut output = format!(
        "{}\n  Server: {} (protocol {}, auth {:?})\n  Session: {} on {}{}\n",
        "Status".bold(),
        ds.config().addr(),
        ds.master_id(),
        ds.authorization(),
        session.id(),
        session.database().cyan(),
        session
            .user()
            .map(|u| format!(" as {}", u))
            .unwrap_or_default(),
    );
    output.push_str(&format!(
        "  Control connections: {}\n  Live sessions: {}\n  Pooled channels: {}\n",
        ds.connection_count(),
        ds.session_count(),
        ds.pooled_channels()
    ));
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => output.push_str(&format!("  Maintenance: {}", json)),
        Err(_) => output.push_str(&format!("  Maintenance: {:?}", stats)),
    }
    output
}
