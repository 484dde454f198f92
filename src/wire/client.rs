//! Minimal line-protocol client: one connection, one request line, one
//! response line.

use serde_json::Value;
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

#[derive(Debug)]
pub enum ClientError {
    Connect(String),
    Send(String),
    Receive(String),
    EmptyResponse,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connect(msg) => write!(f, "connect failed: {msg}"),
            ClientError::Send(msg) => write!(f, "send failed: {msg}"),
            ClientError::Receive(msg) => write!(f, "receive failed: {msg}"),
            ClientError::EmptyResponse => write!(f, "no response (server running?)"),
        }
    }
}

impl std::error::Error for ClientError {}

pub struct Client {
    addr: String,
}

impl Client {
    pub fn new(host: &str, port: u16) -> Self {
        Client {
            addr: format!("{host}:{port}"),
        }
    }

    /// Send one request object and return the raw response line.
    pub fn send(&self, request: &Value) -> Result<String, ClientError> {
        let mut stream =
            TcpStream::connect(&self.addr).map_err(|e| ClientError::Connect(e.to_string()))?;

        let mut line = request.to_string();
        line.push('\n');
        stream
            .write_all(line.as_bytes())
            .map_err(|e| ClientError::Send(e.to_string()))?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader
            .read_line(&mut response)
            .map_err(|e| ClientError::Receive(e.to_string()))?;

        let response = response.trim_end_matches('\n');
        if response.is_empty() {
            return Err(ClientError::EmptyResponse);
        }
        Ok(response.to_string())
    }
}
