use super::parse_numbers::parse_i64;
use crate::command::{CommandFrame, CommandReply, ReplyError};
use crate::keyspace::Keyspace;

pub(super) fn handle_pexpire(
    frame: &CommandFrame,
    keyspace: &mut Keyspace,
    now_ms: u64,
) -> CommandReply {
    let Ok(ttl_ms) = parse_i64(&frame.args[2]) else {
        return CommandReply::Error(ReplyError::BadArg, "expect int64".to_owned());
    };
    let Some(id) = keyspace.lookup(&frame.args[1]) else {
        return CommandReply::Int(0);
    };
    keyspace.set_ttl(id, ttl_ms, now_ms);
    CommandReply::Int(1)
}

pub(super) fn handle_pttl(
    frame: &CommandFrame,
    keyspace: &mut Keyspace,
    now_ms: u64,
) -> CommandReply {
    let Some(id) = keyspace.lookup(&frame.args[1]) else {
        return CommandReply::Int(-2);
    };
    CommandReply::Int(keyspace.ttl_remaining_ms(id, now_ms))
}
