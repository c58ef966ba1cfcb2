use crate::net::frame::ResCode;
use crate::table::Table;

/// Reply payload for an unrecognised verb.
pub const UNKNOWN_CMD: &[u8] = b"Unknown cmd";

/// A recognised client command. Arguments borrow from the request frame.
#[derive(Debug, Eq, PartialEq)]
pub enum Command<'a> {
    Get(&'a [u8]),
    Set(&'a [u8], &'a [u8]),
    Del(&'a [u8]),
    Unknown,
}

impl<'a> Command<'a> {
    /// Match the argument vector against the command table. Verbs fold case
    /// ASCII-only; arity mismatches fall through to `Unknown`.
    #[inline]
    pub fn parse(args: &[&'a [u8]]) -> Command<'a> {
        match *args {
            [verb, key] if verb.eq_ignore_ascii_case(b"get") => Command::Get(key),
            [verb, key, value] if verb.eq_ignore_ascii_case(b"set") => Command::Set(key, value),
            [verb, key] if verb.eq_ignore_ascii_case(b"del") => Command::Del(key),
            _ => Command::Unknown,
        }
    }
}

/// Outcome of executing one command: the rescode plus the reply payload.
/// The payload borrows the stored value for a successful get.
#[derive(Debug, Eq, PartialEq)]
pub struct Reply<'a> {
    pub code: ResCode,
    pub payload: &'a [u8],
}

/// Run one parsed argument vector against the table.
///
/// Deleting an absent key still replies Ok; only an unrecognised verb (or a
/// wrong argument count) produces an Err reply, and it leaves the connection
/// usable.
pub fn execute<'t>(table: &'t mut Table, args: &[&[u8]]) -> Reply<'t> {
    match Command::parse(args) {
        Command::Get(key) => match table.get(key) {
            Some(value) => Reply {
                code: ResCode::Ok,
                payload: value,
            },
            None => Reply {
                code: ResCode::Nx,
                payload: &[],
            },
        },
        Command::Set(key, value) => {
            table.set(key, value);
            Reply {
                code: ResCode::Ok,
                payload: &[],
            }
        }
        Command::Del(key) => {
            table.remove(key);
            Reply {
                code: ResCode::Ok,
                payload: &[],
            }
        }
        Command::Unknown => Reply {
            code: ResCode::Err,
            payload: UNKNOWN_CMD,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verbs() {
        assert_eq!(Command::parse(&[b"get", b"k"]), Command::Get(b"k"));
        assert_eq!(Command::parse(&[b"set", b"k", b"v"]), Command::Set(b"k", b"v"));
        assert_eq!(Command::parse(&[b"del", b"k"]), Command::Del(b"k"));
    }

    #[test]
    fn test_parse_folds_ascii_case() {
        assert_eq!(Command::parse(&[b"GET", b"k"]), Command::Get(b"k"));
        assert_eq!(Command::parse(&[b"SeT", b"k", b"v"]), Command::Set(b"k", b"v"));
        assert_eq!(Command::parse(&[b"DEL", b"k"]), Command::Del(b"k"));
    }

    #[test]
    fn test_parse_rejects_wrong_arity() {
        assert_eq!(Command::parse(&[b"get"]), Command::Unknown);
        assert_eq!(Command::parse(&[b"get", b"k", b"extra"]), Command::Unknown);
        assert_eq!(Command::parse(&[b"set", b"k"]), Command::Unknown);
        assert_eq!(Command::parse(&[]), Command::Unknown);
        assert_eq!(Command::parse(&[b"quit"]), Command::Unknown);
    }

    #[test]
    fn test_execute_get_set_del() {
        let mut table = Table::new();

        let reply = execute(&mut table, &[b"get", b"k"]);
        assert_eq!(reply.code, ResCode::Nx);
        assert_eq!(reply.payload, b"");

        let reply = execute(&mut table, &[b"set", b"k", b"v"]);
        assert_eq!(reply.code, ResCode::Ok);
        assert_eq!(reply.payload, b"");

        let reply = execute(&mut table, &[b"get", b"k"]);
        assert_eq!(reply.code, ResCode::Ok);
        assert_eq!(reply.payload, b"v");

        let reply = execute(&mut table, &[b"del", b"k"]);
        assert_eq!(reply.code, ResCode::Ok);

        let reply = execute(&mut table, &[b"get", b"k"]);
        assert_eq!(reply.code, ResCode::Nx);
    }

    #[test]
    fn test_execute_del_missing_is_ok() {
        let mut table = Table::new();

        let reply = execute(&mut table, &[b"del", b"nope"]);
        assert_eq!(reply.code, ResCode::Ok);
        assert_eq!(reply.payload, b"");
    }

    #[test]
    fn test_execute_unknown_verb() {
        let mut table = Table::new();

        let reply = execute(&mut table, &[b"incr", b"k"]);
        assert_eq!(reply.code, ResCode::Err);
        assert_eq!(reply.payload, UNKNOWN_CMD);
    }
}
