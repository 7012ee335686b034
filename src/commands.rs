//! Command execution.

use crate::{Commands, Credentials};
use colored::Colorize;
use doquedb_client::{ClientError, DataSource, ResultSet, ResultStatus, Session};
use doquedb_protocol::{AvailabilityTarget, Value};

/// Executes a command and returns the formatted output.
pub fn execute(
    ds: &DataSource,
    credentials: Option<&Credentials>,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl { .. } => Err("the REPL is not a one-shot command".into()),
        Commands::Shutdown => Err("shutdown runs without an open data source".into()),

        Commands::Query {
            database,
            sql,
            params,
            json,
        } => {
            let session = open_session(ds, &database, credentials)?;
            let params: Vec<Value> = params.into_iter().map(Value::from).collect();
            let mut rs = session.execute_statement(&sql, &params)?;
            if json {
                format_json_lines(&mut rs)
            } else {
                Ok(format_result(&mut rs)?)
            }
        }

        Commands::Available { database } => {
            let (what, available) = match database {
                Some(id) => (format!("Database {}", id), ds.is_database_available(id)?),
                None => ("Server".to_string(), ds.is_server_available()?),
            };
            if available {
                Ok(format!("{} is {}", what, "available".green()))
            } else {
                Ok(format!("{} is {}", what, "unavailable".red()))
            }
        }

        Commands::Version { database } => {
            let session = open_session(ds, &database, credentials)?;
            let version = session.query_product_version()?;
            Ok(format!(
                "{} (protocol {})",
                version.cyan(),
                ds.master_id()
            ))
        }

        Commands::CreateUser {
            database,
            name,
            new_password,
            id,
        } => {
            let session = open_session(ds, &database, credentials)?;
            session.create_user(&name, &new_password, id)?;
            Ok(format!("{} user {}", "Created".green(), name.cyan()))
        }

        Commands::DropUser {
            database,
            name,
            cascade,
        } => {
            let session = open_session(ds, &database, credentials)?;
            session.drop_user(&name, cascade)?;
            Ok(format!("{} user {}", "Dropped".green(), name.cyan()))
        }

        Commands::ChangePassword {
            database,
            name,
            new_password,
        } => {
            let session = open_session(ds, &database, credentials)?;
            match &name {
                Some(user) => session.change_password(user, &new_password)?,
                None => session.change_own_password(&new_password)?,
            }
            Ok(format!(
                "{} password for {}",
                "Changed".green(),
                name.as_deref().unwrap_or("current user").cyan()
            ))
        }
    }
}

pub fn open_session(
    ds: &DataSource,
    database: &str,
    credentials: Option<&Credentials>,
) -> Result<Session, ClientError> {
    match credentials {
        Some(c) => ds.create_session_with_credentials(database, &c.user, &c.password),
        None => ds.create_session(database),
    }
}

/// Renders every statement of a result as an aligned table followed by its
/// final status.
pub fn format_result(rs: &mut ResultSet) -> Result<String, ClientError> {
    let mut output = String::new();
    loop {
        let rows: Vec<Vec<Value>> = rs.rows().collect::<Result<_, _>>()?;
        let headers: Vec<String> = rs
            .meta()
            .map(|meta| {
                (0..meta.len())
                    .filter_map(|i| meta.column(i))
                    .map(|c| c.label().to_string())
                    .collect()
            })
            .unwrap_or_default();
        if !headers.is_empty() {
            output.push_str(&format_table(&headers, &rows));
        }

        match rs.get_status(false)? {
            ResultStatus::HasMoreData => continue,
            ResultStatus::Success => {
                output.push_str(&"OK".green().to_string());
                break;
            }
            status => {
                output.push_str(&status.to_string().yellow().to_string());
                break;
            }
        }
    }
    Ok(output)
}

fn format_json_lines(rs: &mut ResultSet) -> Result<String, Box<dyn std::error::Error>> {
    let mut lines = Vec::new();
    loop {
        let rows: Vec<Vec<Value>> = rs.rows().collect::<Result<_, _>>()?;
        let labels: Vec<String> = rs
            .meta()
            .map(|meta| {
                (0..meta.len())
                    .filter_map(|i| meta.column(i))
                    .map(|c| c.label().to_string())
                    .collect()
            })
            .unwrap_or_default();
        for row in rows {
            let mut object = serde_json::Map::new();
            for (i, value) in row.iter().enumerate() {
                let key = labels.get(i).cloned().unwrap_or_else(|| format!("col{}", i));
                object.insert(key, serde_json::to_value(value)?);
            }
            lines.push(serde_json::Value::Object(object).to_string());
        }
        if rs.get_status(false)? != ResultStatus::HasMoreData {
            break;
        }
    }
    Ok(lines.join("\n"))
}

fn format_table(headers: &[String], rows: &[Vec<Value>]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let mut output = String::new();
    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:<w$}", h, w = *w))
        .collect();
    output.push_str(&header_line.join(" | ").bold().to_string());
    output.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&rule.join("-+-"));
    output.push('\n');
    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect();
        output.push_str(&line.join(" | "));
        output.push('\n');
    }
    output.push_str(&format!("({} rows)\n", rows.len()).dimmed().to_string());
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use doquedb_client::DataSourceConfig;

    #[test]
    fn test_execute_rejects_commands_handled_by_main() {
        let ds = DataSource::new(DataSourceConfig::new("127.0.0.1", 1));
        assert!(execute(&ds, None, Commands::Shutdown).is_err());
        let repl = Commands::Repl {
            database: "DefaultDB".to_string(),
        };
        assert!(execute(&ds, None, repl).is_err());
        assert!(!ds.is_open());
    }

    #[test]
    fn test_format_table_aligns_columns() {
        colored::control::set_override(false);
        let headers = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            vec![Value::Integer(1), Value::from("alpha")],
            vec![Value::Integer(22), Value::from("b")],
        ];
        let table = format_table(&headers, &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "id | name ");
        assert_eq!(lines[1], "---+------");
        assert_eq!(lines[2], "1  | alpha");
        assert_eq!(lines[3], "22 | b    ");
        assert_eq!(lines[4], "(2 rows)");
    }
}
