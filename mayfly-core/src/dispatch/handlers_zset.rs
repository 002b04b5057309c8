use super::parse_numbers::{parse_finite_f64, parse_i64};
use crate::command::{CommandFrame, CommandReply, ReplyError};
use crate::keyspace::{Keyspace, Value};
use crate::zset::SortedSet;

fn wrong_type() -> CommandReply {
    CommandReply::Error(ReplyError::BadType, "expect zset".to_owned())
}

// A missing key behaves like an empty sorted set; only a live entry of a
// different kind is a type error.
fn zset_mut<'a>(
    keyspace: &'a mut Keyspace,
    key: &[u8],
) -> Result<Option<&'a mut SortedSet>, CommandReply> {
    match keyspace.get_mut(key) {
        None => Ok(None),
        Some(entry) => match &mut entry.value {
            Value::ZSet(set) => Ok(Some(set)),
            Value::Str(_) => Err(wrong_type()),
        },
    }
}

pub(super) fn handle_zadd(
    frame: &CommandFrame,
    keyspace: &mut Keyspace,
    _now_ms: u64,
) -> CommandReply {
    let Ok(score) = parse_finite_f64(&frame.args[2]) else {
        return CommandReply::Error(ReplyError::BadArg, "expect float".to_owned());
    };
    let key = &frame.args[1];
    let id = match keyspace.lookup(key) {
        Some(id) => id,
        None => keyspace.insert(key, Value::ZSet(SortedSet::new())),
    };
    match &mut keyspace.entry_mut(id).value {
        Value::ZSet(set) => {
            let added = set.insert(&frame.args[3], score);
            CommandReply::Int(i64::from(added))
        }
        Value::Str(_) => wrong_type(),
    }
}

pub(super) fn handle_zrem(
    frame: &CommandFrame,
    keyspace: &mut Keyspace,
    _now_ms: u64,
) -> CommandReply {
    match zset_mut(keyspace, &frame.args[1]) {
        Err(reply) => reply,
        Ok(None) => CommandReply::Int(0),
        Ok(Some(set)) => CommandReply::Int(i64::from(set.remove(&frame.args[2]))),
    }
}

pub(super) fn handle_zscore(
    frame: &CommandFrame,
    keyspace: &mut Keyspace,
    _now_ms: u64,
) -> CommandReply {
    match zset_mut(keyspace, &frame.args[1]) {
        Err(reply) => reply,
        Ok(None) => CommandReply::Nil,
        Ok(Some(set)) => set
            .score(&frame.args[2])
            .map_or(CommandReply::Nil, CommandReply::Double),
    }
}

pub(super) fn handle_zquery(
    frame: &CommandFrame,
    keyspace: &mut Keyspace,
    _now_ms: u64,
) -> CommandReply {
    let Ok(score) = parse_finite_f64(&frame.args[2]) else {
        return CommandReply::Error(ReplyError::BadArg, "expect fp number".to_owned());
    };
    let (Ok(offset), Ok(limit)) = (parse_i64(&frame.args[4]), parse_i64(&frame.args[5])) else {
        return CommandReply::Error(ReplyError::BadArg, "expect int".to_owned());
    };
    let set = match zset_mut(keyspace, &frame.args[1]) {
        Err(reply) => return reply,
        Ok(None) => return CommandReply::Array(Vec::new()),
        Ok(Some(set)) => &*set,
    };
    if limit <= 0 {
        return CommandReply::Array(Vec::new());
    }
    let Some(start) = set
        .seek_ge(score, &frame.args[3])
        .and_then(|at| set.offset(at, offset))
    else {
        return CommandReply::Array(Vec::new());
    };

    // The element budget counts appended values, two per pair, checked
    // before each pair goes out.
    let mut items = Vec::new();
    let mut appended = 0_i64;
    for (score, name) in set.iter_from(start) {
        if appended >= limit {
            break;
        }
        items.push(CommandReply::Str(name.to_vec()));
        items.push(CommandReply::Double(score));
        appended += 2;
    }
    CommandReply::Array(items)
}
