use super::handlers_expiry::{handle_pexpire, handle_pttl};
use super::handlers_string::{handle_del, handle_get, handle_keys, handle_set};
use super::handlers_zset::{handle_zadd, handle_zquery, handle_zrem, handle_zscore};
use super::CommandSpec;
use crate::command::{CommandFrame, CommandReply, ReplyError};
use crate::containers::HotMap;
use crate::keyspace::Keyspace;

/// Runtime command registry.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    entries: HotMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    /// Builds a registry preloaded with the full command surface.
    #[must_use]
    pub fn with_builtin_commands() -> Self {
        let mut registry = Self {
            entries: HotMap::new(),
        };
        registry.register_string_commands();
        registry.register_expiry_commands();
        registry.register_zset_commands();
        registry
    }

    fn register_string_commands(&mut self) {
        self.register(CommandSpec {
            name: "get",
            arity: 2,
            handler: handle_get,
        });
        self.register(CommandSpec {
            name: "set",
            arity: 3,
            handler: handle_set,
        });
        self.register(CommandSpec {
            name: "del",
            arity: 2,
            handler: handle_del,
        });
        self.register(CommandSpec {
            name: "keys",
            arity: 1,
            handler: handle_keys,
        });
    }

    fn register_expiry_commands(&mut self) {
        self.register(CommandSpec {
            name: "pexpire",
            arity: 3,
            handler: handle_pexpire,
        });
        self.register(CommandSpec {
            name: "pttl",
            arity: 2,
            handler: handle_pttl,
        });
    }

    fn register_zset_commands(&mut self) {
        self.register(CommandSpec {
            name: "zadd",
            arity: 4,
            handler: handle_zadd,
        });
        self.register(CommandSpec {
            name: "zrem",
            arity: 3,
            handler: handle_zrem,
        });
        self.register(CommandSpec {
            name: "zscore",
            arity: 3,
            handler: handle_zscore,
        });
        self.register(CommandSpec {
            name: "zquery",
            arity: 6,
            handler: handle_zquery,
        });
    }

    /// Registers or replaces one command in the table.
    pub fn register(&mut self, spec: CommandSpec) {
        let _ = self.entries.insert(spec.name, spec);
    }

    /// Dispatches one command frame to its registered handler.
    ///
    /// Keywords are matched case-sensitively against their lowercase
    /// registered form, and the argument count must match exactly. A name
    /// miss and a count mismatch are indistinguishable on the wire: both
    /// report an unknown command.
    #[must_use]
    pub fn dispatch(
        &self,
        frame: &CommandFrame,
        keyspace: &mut Keyspace,
        now_ms: u64,
    ) -> CommandReply {
        let Some(spec) = std::str::from_utf8(frame.name())
            .ok()
            .and_then(|name| self.entries.get(name))
        else {
            return unknown_command();
        };
        if frame.args.len() != spec.arity {
            return unknown_command();
        }
        (spec.handler)(frame, keyspace, now_ms)
    }
}

fn unknown_command() -> CommandReply {
    CommandReply::Error(ReplyError::Unknown, "unknown command.".to_owned())
}
