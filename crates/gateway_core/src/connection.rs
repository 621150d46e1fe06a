//! Client connection seam.
//!
//! The wire codec lives outside this crate. A [`Connection`] hands us raw
//! command packets and accepts typed responses to encode.
use crate::errors::Result;
use crate::result::{OkPacket, ResultSet};
use async_trait::async_trait;

pub const COM_QUIT: u8 = 0x01;
pub const COM_INIT_DB: u8 = 0x02;
pub const COM_QUERY: u8 = 0x03;
pub const COM_FIELD_LIST: u8 = 0x04;
pub const COM_PING: u8 = 0x0e;
pub const COM_STMT_PREPARE: u8 = 0x16;

/// Autocommit flag in the server status bitmask.
pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

/// Protocol name for a command tag.
pub fn command_name(tag: u8) -> &'static str {
    match tag {
        0x00 => "COM_SLEEP",
        COM_QUIT => "COM_QUIT",
        COM_INIT_DB => "COM_INIT_DB",
        COM_QUERY => "COM_QUERY",
        COM_FIELD_LIST => "COM_FIELD_LIST",
        0x05 => "COM_CREATE_DB",
        0x06 => "COM_DROP_DB",
        0x07 => "COM_REFRESH",
        0x08 => "COM_SHUTDOWN",
        0x09 => "COM_STATISTICS",
        0x0a => "COM_PROCESS_INFO",
        0x0b => "COM_CONNECT",
        0x0c => "COM_PROCESS_KILL",
        0x0d => "COM_DEBUG",
        COM_PING => "COM_PING",
        0x11 => "COM_CHANGE_USER",
        0x12 => "COM_BINLOG_DUMP",
        COM_STMT_PREPARE => "COM_STMT_PREPARE",
        0x17 => "COM_STMT_EXECUTE",
        0x18 => "COM_STMT_SEND_LONG_DATA",
        0x19 => "COM_STMT_CLOSE",
        0x1a => "COM_STMT_RESET",
        0x1b => "COM_SET_OPTION",
        0x1c => "COM_STMT_FETCH",
        0x1f => "COM_RESET_CONNECTION",
        _ => "COM_UNKNOWN",
    }
}

/// An established client connection.
#[async_trait]
pub trait Connection: Send {
    /// Read the next command packet, returning the command tag and payload.
    ///
    /// `None` means the client went away.
    async fn read_command(&mut self) -> Result<Option<(u8, Vec<u8>)>>;

    /// Write an OK packet. `None` writes the default OK.
    async fn write_ok(&mut self, ok: Option<OkPacket>) -> Result<()>;

    async fn write_error(&mut self, code: u16, sql_state: &str, message: &str) -> Result<()>;

    /// Write column definitions followed by every row.
    async fn write_result_set(&mut self, status: u16, result: ResultSet) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!("COM_QUERY", command_name(COM_QUERY));
        assert_eq!("COM_STMT_PREPARE", command_name(0x16));
        assert_eq!("COM_UNKNOWN", command_name(0xfe));
    }
}
