// Copyright 2026 memd Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Incremental parser for memcached text protocol command headers.
//!
//! A header is a single line terminated by `\r\n`. Storage commands declare
//! how many bytes of argument body follow the header; the parser reports
//! that length through [`Parser::build`], it does not consume the body.

use std::str::FromStr;

use memd_common::error::{Error, ErrorKind, Result};

use crate::command::{Command, StoreOp};

/// Streaming header parser with the reset / parse / build contract.
#[derive(Debug, Default)]
pub struct Parser {
    parsed: Option<(Command, usize)>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear parser state for a new command.
    pub fn reset(&mut self) {
        self.parsed = None;
    }

    /// Attempt to recognise a complete command header in `buf`.
    ///
    /// Returns `Ok(Some(consumed))` once the header line is complete,
    /// `Ok(None)` when more input is needed. Malformed headers fail with
    /// [`ErrorKind::Protocol`].
    pub fn parse(&mut self, buf: &[u8]) -> Result<Option<usize>> {
        let Some(pos) = buf.windows(2).position(|sep| sep == b"\r\n") else {
            return Ok(None);
        };

        self.parsed = Some(parse_header(&buf[..pos])?);
        Ok(Some(pos + 2))
    }

    /// Take the parsed command and the length of the argument body that
    /// follows it (0 for commands without one).
    ///
    /// Returns `None` unless the preceding [`Parser::parse`] succeeded.
    pub fn build(&mut self) -> Option<(Command, usize)> {
        self.parsed.take()
    }
}

fn parse_header(line: &[u8]) -> Result<(Command, usize)> {
    let mut tokens = line.split(|&b| b == b' ').filter(|t| !t.is_empty());

    let Some(verb) = tokens.next() else {
        return Err(protocol_error("empty command line"));
    };

    match verb {
        b"get" => {
            let keys: Vec<Vec<u8>> = tokens.map(<[u8]>::to_vec).collect();
            if keys.is_empty() {
                return Err(protocol_error("get requires at least one key"));
            }
            Ok((Command::Get { keys }, 0))
        }
        b"set" | b"add" | b"replace" | b"append" | b"prepend" => {
            let op = match verb {
                b"set" => StoreOp::Set,
                b"add" => StoreOp::Add,
                b"replace" => StoreOp::Replace,
                b"append" => StoreOp::Append,
                _ => StoreOp::Prepend,
            };

            let key = tokens.next().ok_or_else(|| protocol_error("missing key"))?.to_vec();
            let flags: u32 = parse_num(tokens.next())?;
            // Expiry is accepted for wire compatibility and ignored.
            let _exptime: i64 = parse_num(tokens.next())?;
            let bytes: usize = parse_num(tokens.next())?;
            let noreply = parse_noreply(tokens.next())?;

            Ok((
                Command::Store {
                    op,
                    key,
                    flags,
                    noreply,
                },
                bytes,
            ))
        }
        b"delete" => {
            let key = tokens.next().ok_or_else(|| protocol_error("missing key"))?.to_vec();
            let noreply = parse_noreply(tokens.next())?;
            Ok((Command::Delete { key, noreply }, 0))
        }
        b"version" => Ok((Command::Version, 0)),
        _ => Ok((Command::Unknown, 0)),
    }
}

fn parse_num<T: FromStr>(token: Option<&[u8]>) -> Result<T> {
    let token = token.ok_or_else(|| protocol_error("missing numeric field"))?;
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| protocol_error("malformed numeric field"))
}

fn parse_noreply(token: Option<&[u8]>) -> Result<bool> {
    match token {
        None => Ok(false),
        Some(b"noreply") => Ok(true),
        Some(_) => Err(protocol_error("trailing garbage after command")),
    }
}

fn protocol_error(message: &str) -> Error {
    Error::new(ErrorKind::Protocol, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &[u8]) -> (Command, usize, usize) {
        let mut parser = Parser::new();
        let consumed = parser.parse(input).unwrap().unwrap();
        let (command, body) = parser.build().unwrap();
        (command, body, consumed)
    }

    #[test]
    fn test_parse_get() {
        let (command, body, consumed) = parse_one(b"get key\r\n");
        assert_eq!(
            command,
            Command::Get {
                keys: vec![b"key".to_vec()]
            }
        );
        assert_eq!(body, 0);
        assert_eq!(consumed, 9);
    }

    #[test]
    fn test_parse_multi_get() {
        let (command, _, _) = parse_one(b"get a b c\r\n");
        assert_eq!(
            command,
            Command::Get {
                keys: vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
            }
        );
    }

    #[test]
    fn test_parse_set_reports_body_size() {
        let (command, body, consumed) = parse_one(b"set key 7 0 3\r\nabc\r\n");
        assert_eq!(
            command,
            Command::Store {
                op: StoreOp::Set,
                key: b"key".to_vec(),
                flags: 7,
                noreply: false,
            }
        );
        assert_eq!(body, 3);
        // The body is not consumed by the header parse.
        assert_eq!(consumed, 15);
    }

    #[test]
    fn test_parse_noreply() {
        let (command, _, _) = parse_one(b"delete key noreply\r\n");
        assert_eq!(
            command,
            Command::Delete {
                key: b"key".to_vec(),
                noreply: true,
            }
        );
    }

    #[test]
    fn test_parse_partial_header() {
        let mut parser = Parser::new();
        assert_eq!(parser.parse(b"set key 0 0").unwrap(), None);
        assert!(parser.build().is_none());

        // The same parser finishes once the terminator arrives.
        assert_eq!(parser.parse(b"set key 0 0 3\r\n").unwrap(), Some(15));
        assert!(parser.build().is_some());
    }

    #[test]
    fn test_parse_rejects_malformed_numbers() {
        let mut parser = Parser::new();
        let err = parser.parse(b"set key 0 0 abc\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let err = parser.parse(b"get\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_parse_unknown_verb() {
        let (command, body, _) = parse_one(b"bogus whatever\r\n");
        assert_eq!(command, Command::Unknown);
        assert_eq!(body, 0);
    }

    #[test]
    fn test_reset_discards_parsed_command() {
        let mut parser = Parser::new();
        parser.parse(b"version\r\n").unwrap().unwrap();
        parser.reset();
        assert!(parser.build().is_none());
    }
}
