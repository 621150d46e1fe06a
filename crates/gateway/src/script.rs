//! Connection that replays a fixed list of commands and prints responses.
use async_trait::async_trait;
use gateway_core::connection::{COM_INIT_DB, COM_QUERY, COM_QUIT, Connection};
use gateway_core::errors::Result;
use gateway_core::result::{OkPacket, ResultSet};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Feeds queued commands to a session and writes responses as text tables.
pub struct ScriptedConnection<W> {
    commands: VecDeque<(u8, Vec<u8>)>,
    out: W,
    errors: Arc<AtomicUsize>,
}

impl<W: Write + Send> ScriptedConnection<W> {
    pub fn new(out: W) -> Self {
        ScriptedConnection {
            commands: VecDeque::new(),
            out,
            errors: Arc::default(),
        }
    }

    pub fn push_init_db(&mut self, schema: &str) {
        self.commands
            .push_back((COM_INIT_DB, schema.as_bytes().to_vec()));
    }

    pub fn push_query(&mut self, sql: &str) {
        self.commands
            .push_back((COM_QUERY, sql.as_bytes().to_vec()));
    }

    /// Counter of error responses, readable after the connection is handed
    /// off to a session.
    pub fn error_counter(&self) -> Arc<AtomicUsize> {
        self.errors.clone()
    }
}

#[async_trait]
impl<W: Write + Send> Connection for ScriptedConnection<W> {
    async fn read_command(&mut self) -> Result<Option<(u8, Vec<u8>)>> {
        // Always end with a quit so the session closes cleanly.
        Ok(Some(
            self.commands
                .pop_front()
                .unwrap_or_else(|| (COM_QUIT, Vec::new())),
        ))
    }

    async fn write_ok(&mut self, _ok: Option<OkPacket>) -> Result<()> {
        writeln!(self.out, "OK")?;
        Ok(())
    }

    async fn write_error(&mut self, code: u16, sql_state: &str, message: &str) -> Result<()> {
        self.errors.fetch_add(1, Ordering::Relaxed);
        writeln!(self.out, "ERROR {code} ({sql_state}): {message}")?;
        Ok(())
    }

    async fn write_result_set(&mut self, _status: u16, result: ResultSet) -> Result<()> {
        let headers: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
        let rows: Vec<Vec<String>> = result
            .rows
            .map(|row| {
                row.iter()
                    .map(|v| v.to_text().unwrap_or_else(|| "NULL".to_string()))
                    .collect()
            })
            .collect();
        write_table(&mut self.out, &headers, &rows)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Write a bordered text table.
pub fn write_table(
    out: &mut impl Write,
    headers: &[String],
    rows: &[Vec<String>],
) -> std::io::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let border: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+";

    let line = |cells: &[String]| -> String {
        widths
            .iter()
            .zip(cells)
            .map(|(&w, c)| format!("| {c:<w$} "))
            .collect::<String>()
            + "|"
    };

    writeln!(out, "{border}")?;
    writeln!(out, "{}", line(headers))?;
    writeln!(out, "{border}")?;
    for row in rows {
        writeln!(out, "{}", line(row.as_slice()))?;
    }
    writeln!(out, "{border}")?;
    let noun = if rows.len() == 1 { "row" } else { "rows" };
    writeln!(out, "{} {noun}", rows.len())?;
    Ok(())
}
