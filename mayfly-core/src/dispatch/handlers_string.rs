use crate::command::{CommandFrame, CommandReply, ReplyError};
use crate::keyspace::{Keyspace, Value};

pub(super) fn handle_get(
    frame: &CommandFrame,
    keyspace: &mut Keyspace,
    _now_ms: u64,
) -> CommandReply {
    let Some(entry) = keyspace.get(&frame.args[1]) else {
        return CommandReply::Nil;
    };
    match &entry.value {
        Value::Str(payload) => CommandReply::Str(payload.clone()),
        Value::ZSet(_) => {
            CommandReply::Error(ReplyError::BadType, "not a string value".to_owned())
        }
    }
}

pub(super) fn handle_set(
    frame: &CommandFrame,
    keyspace: &mut Keyspace,
    _now_ms: u64,
) -> CommandReply {
    let key = &frame.args[1];
    let payload = frame.args[2].clone();
    if let Some(entry) = keyspace.get_mut(key) {
        match &mut entry.value {
            Value::Str(current) => *current = payload,
            Value::ZSet(_) => {
                return CommandReply::Error(
                    ReplyError::BadType,
                    "a non-string value exists".to_owned(),
                );
            }
        }
    } else {
        let _ = keyspace.insert(key, Value::Str(payload));
    }
    CommandReply::Nil
}

pub(super) fn handle_del(
    frame: &CommandFrame,
    keyspace: &mut Keyspace,
    _now_ms: u64,
) -> CommandReply {
    let removed = keyspace.remove(&frame.args[1]);
    CommandReply::Int(i64::from(removed))
}

pub(super) fn handle_keys(
    _frame: &CommandFrame,
    keyspace: &mut Keyspace,
    _now_ms: u64,
) -> CommandReply {
    let mut keys = Vec::with_capacity(keyspace.len());
    keyspace.for_each_key(|key| keys.push(CommandReply::Str(key.to_vec())));
    CommandReply::Array(keys)
}
