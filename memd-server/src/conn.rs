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

use std::{
    io::{Read, Write},
    net::TcpStream,
    sync::atomic::{AtomicBool, Ordering},
};

use memd_memory::Storage;
use parking_lot::Mutex;

use crate::protocol::Parser;

/// Fixed per-connection receive buffer size. Command headers and argument
/// bodies must fit in it.
pub(crate) const BUF_SIZE: usize = 1024;

const MSG_TOO_LONG: &[u8] = b"Command arguments are too long\r\n";
const MSG_BAD_HEADER: &[u8] = b"CLIENT_ERROR bad command line format\r\n";
const MSG_BAD_CHUNK: &[u8] = b"CLIENT_ERROR bad data chunk\r\n";

/// Process requests on one connection until the client disconnects, an I/O
/// error occurs, or the server stops.
///
/// Any `Err` return is treated as a disconnect by the caller; the protocol
/// offers no way to resynchronise a desynced stream.
pub(crate) fn serve<S: Storage>(
    mut stream: TcpStream,
    storage: &Mutex<S>,
    running: &AtomicBool,
) -> std::io::Result<()> {
    let mut buf = [0u8; BUF_SIZE];
    let mut len = 0usize;
    let mut parser = Parser::new();

    while running.load(Ordering::Acquire) {
        parser.reset();

        // Read until a complete header is recognised. Residual bytes from
        // the previous request are parsed first so pipelined commands never
        // stall waiting for input that will not come.
        let consumed = loop {
            if len > 0 {
                match parser.parse(&buf[..len]) {
                    Ok(Some(consumed)) => break consumed,
                    Ok(None) if len == BUF_SIZE => {
                        let _ = stream.write_all(MSG_TOO_LONG);
                        return Ok(());
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::debug!("[conn]: malformed header: {err}");
                        let _ = stream.write_all(MSG_BAD_HEADER);
                        return Ok(());
                    }
                }
            }

            let n = stream.read(&mut buf[len..])?;
            if n == 0 {
                return Ok(());
            }
            len += n;
        };

        buf.copy_within(consumed..len, 0);
        len -= consumed;

        let Some((command, body_size)) = parser.build() else {
            unreachable!("build follows a successful parse");
        };

        // The argument body and its terminator must fit in the buffer.
        let mut frame = 0;
        if body_size > 0 {
            if body_size + 2 > BUF_SIZE {
                let _ = stream.write_all(MSG_TOO_LONG);
                return Ok(());
            }
            while len < body_size + 2 {
                let n = stream.read(&mut buf[len..])?;
                if n == 0 {
                    return Ok(());
                }
                len += n;
            }
            if buf[body_size..body_size + 2] != *b"\r\n" {
                let _ = stream.write_all(MSG_BAD_CHUNK);
                return Ok(());
            }
            frame = body_size + 2;
        }

        let mut response = Vec::new();
        {
            let mut storage = storage.lock();
            command.execute(&mut *storage, &buf[..body_size], &mut response);
        }
        response.extend_from_slice(b"\r\n");

        if !command.noreply() {
            stream.write_all(&response)?;
        }

        buf.copy_within(frame..len, 0);
        len -= frame;
    }

    Ok(())
}
