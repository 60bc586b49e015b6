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

use memd_memory::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

/// A parsed request, executable against a [`Storage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get {
        keys: Vec<Vec<u8>>,
    },
    Store {
        op: StoreOp,
        key: Vec<u8>,
        flags: u32,
        noreply: bool,
    },
    Delete {
        key: Vec<u8>,
        noreply: bool,
    },
    Version,
    Unknown,
}

impl Command {
    /// Whether the client asked for the response to be suppressed.
    pub fn noreply(&self) -> bool {
        match self {
            Command::Store { noreply, .. } | Command::Delete { noreply, .. } => *noreply,
            _ => false,
        }
    }

    /// Run the command against `storage`, writing the response payload into
    /// `out`. The caller appends the final line terminator.
    ///
    /// `body` is the argument body declared by the header (empty for
    /// commands without one).
    pub fn execute(&self, storage: &mut dyn Storage, body: &[u8], out: &mut Vec<u8>) {
        match self {
            Command::Get { keys } => {
                for key in keys {
                    // Flags are not persisted; echo the protocol default.
                    // Keys are binary-safe and pass through untouched.
                    if let Some(value) = storage.get(key) {
                        let suffix = format!(" 0 {}\r\n", value.len());
                        let value = value.to_vec();
                        out.extend_from_slice(b"VALUE ");
                        out.extend_from_slice(key);
                        out.extend_from_slice(suffix.as_bytes());
                        out.extend_from_slice(&value);
                        out.extend_from_slice(b"\r\n");
                    }
                }
                out.extend_from_slice(b"END");
            }
            Command::Store { op, key, .. } => {
                let stored = match op {
                    StoreOp::Set => {
                        if storage.put(key, body) {
                            out.extend_from_slice(b"STORED");
                        } else {
                            out.extend_from_slice(b"SERVER_ERROR object too large for cache");
                        }
                        return;
                    }
                    StoreOp::Add => storage.put_if_absent(key, body),
                    StoreOp::Replace => storage.set(key, body),
                    StoreOp::Append | StoreOp::Prepend => {
                        match storage.get(key).map(<[u8]>::to_vec) {
                            None => false,
                            Some(old) => {
                                let mut merged = Vec::with_capacity(old.len() + body.len());
                                if *op == StoreOp::Append {
                                    merged.extend_from_slice(&old);
                                    merged.extend_from_slice(body);
                                } else {
                                    merged.extend_from_slice(body);
                                    merged.extend_from_slice(&old);
                                }
                                if !storage.put(key, &merged) {
                                    out.extend_from_slice(b"SERVER_ERROR object too large for cache");
                                    return;
                                }
                                true
                            }
                        }
                    }
                };
                out.extend_from_slice(if stored { b"STORED" } else { b"NOT_STORED" });
            }
            Command::Delete { key, .. } => {
                out.extend_from_slice(if storage.delete(key) { b"DELETED" } else { b"NOT_FOUND" });
            }
            Command::Version => {
                out.extend_from_slice(b"VERSION ");
                out.extend_from_slice(env!("CARGO_PKG_VERSION").as_bytes());
            }
            Command::Unknown => {
                out.extend_from_slice(b"ERROR");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use memd_memory::LruStore;

    use super::*;

    fn run(store: &mut LruStore, command: &Command, body: &[u8]) -> String {
        let mut out = Vec::new();
        command.execute(store, body, &mut out);
        String::from_utf8(out).unwrap()
    }

    fn store_cmd(op: StoreOp, key: &[u8]) -> Command {
        Command::Store {
            op,
            key: key.to_vec(),
            flags: 0,
            noreply: false,
        }
    }

    #[test]
    fn test_set_then_get() {
        let mut store = LruStore::with_capacity(1024);

        let response = run(&mut store, &store_cmd(StoreOp::Set, b"key"), b"abc");
        assert_eq!(response, "STORED");

        let get = Command::Get {
            keys: vec![b"key".to_vec()],
        };
        assert_eq!(run(&mut store, &get, b""), "VALUE key 0 3\r\nabc\r\nEND");
    }

    #[test]
    fn test_get_echoes_binary_key_verbatim() {
        let mut store = LruStore::with_capacity(1024);
        let key = [0xffu8, 0x00, 0xfe];

        let set = Command::Store {
            op: StoreOp::Set,
            key: key.to_vec(),
            flags: 0,
            noreply: false,
        };
        let mut out = Vec::new();
        set.execute(&mut store, b"v", &mut out);
        assert_eq!(out, b"STORED");

        let get = Command::Get {
            keys: vec![key.to_vec()],
        };
        out.clear();
        get.execute(&mut store, b"", &mut out);

        let mut expected = b"VALUE ".to_vec();
        expected.extend_from_slice(&key);
        expected.extend_from_slice(b" 0 1\r\nv\r\nEND");
        assert_eq!(out, expected);
    }

    #[test]
    fn test_get_miss_is_just_end() {
        let mut store = LruStore::with_capacity(1024);
        let get = Command::Get {
            keys: vec![b"nope".to_vec()],
        };
        assert_eq!(run(&mut store, &get, b""), "END");
    }

    #[test]
    fn test_multi_get_skips_misses() {
        let mut store = LruStore::with_capacity(1024);
        run(&mut store, &store_cmd(StoreOp::Set, b"a"), b"1");
        run(&mut store, &store_cmd(StoreOp::Set, b"c"), b"3");

        let get = Command::Get {
            keys: vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()],
        };
        assert_eq!(
            run(&mut store, &get, b""),
            "VALUE a 0 1\r\n1\r\nVALUE c 0 1\r\n3\r\nEND"
        );
    }

    #[test]
    fn test_add_and_replace() {
        let mut store = LruStore::with_capacity(1024);

        assert_eq!(run(&mut store, &store_cmd(StoreOp::Replace, b"k"), b"v"), "NOT_STORED");
        assert_eq!(run(&mut store, &store_cmd(StoreOp::Add, b"k"), b"v"), "STORED");
        assert_eq!(run(&mut store, &store_cmd(StoreOp::Add, b"k"), b"w"), "NOT_STORED");
        assert_eq!(run(&mut store, &store_cmd(StoreOp::Replace, b"k"), b"w"), "STORED");
    }

    #[test]
    fn test_append_prepend() {
        let mut store = LruStore::with_capacity(1024);

        assert_eq!(run(&mut store, &store_cmd(StoreOp::Append, b"k"), b"x"), "NOT_STORED");
        run(&mut store, &store_cmd(StoreOp::Set, b"k"), b"mid");
        assert_eq!(run(&mut store, &store_cmd(StoreOp::Append, b"k"), b"-end"), "STORED");
        assert_eq!(run(&mut store, &store_cmd(StoreOp::Prepend, b"k"), b"pre-"), "STORED");

        let get = Command::Get {
            keys: vec![b"k".to_vec()],
        };
        assert_eq!(
            run(&mut store, &get, b""),
            "VALUE k 0 11\r\npre-mid-end\r\nEND"
        );
    }

    #[test]
    fn test_delete() {
        let mut store = LruStore::with_capacity(1024);

        let delete = Command::Delete {
            key: b"k".to_vec(),
            noreply: false,
        };
        assert_eq!(run(&mut store, &delete, b""), "NOT_FOUND");
        run(&mut store, &store_cmd(StoreOp::Set, b"k"), b"v");
        assert_eq!(run(&mut store, &delete, b""), "DELETED");
        assert_eq!(run(&mut store, &delete, b""), "NOT_FOUND");
    }

    #[test]
    fn test_set_oversize_value() {
        let mut store = LruStore::with_capacity(4);
        assert_eq!(
            run(&mut store, &store_cmd(StoreOp::Set, b"key"), b"abcdef"),
            "SERVER_ERROR object too large for cache"
        );
    }
}
