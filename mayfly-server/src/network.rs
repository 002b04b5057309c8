//! Reactor-style network event loop for the tagged binary protocol.
//!
//! One thread owns every socket, the keyspace, and both timer sources.
//! Sockets are registered in `mio::Poll` under a token equal to their
//! connection-table slot; reads and writes drain until `WouldBlock` (mio
//! readiness is edge-style); after every poll cycle idle connections are
//! reaped and expired keys evicted, and the next poll timeout comes from
//! whichever timer source fires first.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use mayfly_common::clock::MonotonicClock;
use mayfly_common::config::RuntimeConfig;
use mayfly_common::error::{MayflyError, MayflyResult};
use mayfly_core::dispatch::CommandRegistry;
use mayfly_core::keyspace::Keyspace;
use mayfly_facade::protocol::{append_response, RequestParser};

const LISTENER_TOKEN: Token = Token(0);
const CONNECTION_TOKEN_START: usize = 1;
const READ_CHUNK_BYTES: usize = 64 * 1024;
/// Sentinel for absent idle-queue links.
const NO_SLOT: usize = usize::MAX;

#[derive(Debug)]
struct ReactorConnection {
    socket: TcpStream,
    parser: RequestParser,
    outgoing: Vec<u8>,
    want_read: bool,
    want_write: bool,
    want_close: bool,
    last_active_ms: u64,
    idle_prev: usize,
    idle_next: usize,
    interest: Interest,
}

impl ReactorConnection {
    fn new(socket: TcpStream, now_ms: u64) -> Self {
        Self {
            socket,
            parser: RequestParser::new(),
            outgoing: Vec::new(),
            want_read: true,
            want_write: false,
            want_close: false,
            last_active_ms: now_ms,
            idle_prev: NO_SLOT,
            idle_next: NO_SLOT,
            interest: Interest::READABLE,
        }
    }
}

type ConnectionTable = Vec<Option<ReactorConnection>>;

/// FIFO of live connection slots ordered by last I/O activity.
///
/// The link cells live inside the connection slots themselves, so detach
/// and push-back stay O(1) regardless of queue length. The front is the
/// least-recently-active connection.
#[derive(Debug)]
struct IdleQueue {
    head: usize,
    tail: usize,
}

impl IdleQueue {
    fn new() -> Self {
        Self {
            head: NO_SLOT,
            tail: NO_SLOT,
        }
    }

    fn front(&self) -> Option<usize> {
        link(self.head)
    }

    fn push_back(&mut self, table: &mut ConnectionTable, slot: usize) {
        set_links(table, slot, self.tail, NO_SLOT);
        match link(self.tail) {
            Some(tail) => set_next(table, tail, slot),
            None => self.head = slot,
        }
        self.tail = slot;
    }

    fn detach(&mut self, table: &mut ConnectionTable, slot: usize) {
        let Some(conn) = table[slot].as_ref() else {
            return;
        };
        let (prev, next) = (conn.idle_prev, conn.idle_next);
        if prev == NO_SLOT && next == NO_SLOT && self.head != slot {
            return;
        }
        match link(prev) {
            Some(prev) => set_next(table, prev, next),
            None => self.head = next,
        }
        match link(next) {
            Some(next) => set_prev(table, next, prev),
            None => self.tail = prev,
        }
        set_links(table, slot, NO_SLOT, NO_SLOT);
    }
}

fn link(slot: usize) -> Option<usize> {
    (slot != NO_SLOT).then_some(slot)
}

fn set_links(table: &mut ConnectionTable, slot: usize, prev: usize, next: usize) {
    if let Some(conn) = table[slot].as_mut() {
        conn.idle_prev = prev;
        conn.idle_next = next;
    }
}

fn set_prev(table: &mut ConnectionTable, slot: usize, prev: usize) {
    if let Some(conn) = table[slot].as_mut() {
        conn.idle_prev = prev;
    }
}

fn set_next(table: &mut ConnectionTable, slot: usize, next: usize) {
    if let Some(conn) = table[slot].as_mut() {
        conn.idle_next = next;
    }
}

/// One reactor instance owning the listener, all connection state, the
/// keyspace, and both timer sources.
#[derive(Debug)]
pub struct ServerReactor {
    poll: Poll,
    events: Events,
    ready_events: Vec<(Token, bool, bool, bool)>,
    listener: TcpListener,
    connections: ConnectionTable,
    idle: IdleQueue,
    keyspace: Keyspace,
    registry: CommandRegistry,
    clock: MonotonicClock,
    config: RuntimeConfig,
}

impl ServerReactor {
    /// Binds the listener and registers it in the reactor poller.
    ///
    /// # Errors
    ///
    /// Returns `MayflyError::InvalidConfig` for unusable config values and
    /// `MayflyError::Io` if the listener bind or poll registration fails.
    pub fn bind(addr: SocketAddr, config: RuntimeConfig) -> MayflyResult<Self> {
        config.validate()?;
        let poll = Poll::new()
            .map_err(|error| MayflyError::Io(format!("create poll failed: {error}")))?;
        let mut listener = TcpListener::bind(addr)
            .map_err(|error| MayflyError::Io(format!("bind listener failed: {error}")))?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(|error| {
                MayflyError::Io(format!("register listener in poll failed: {error}"))
            })?;

        let max_events = config.max_events.max(64);
        let keyspace = Keyspace::new(config.destructor_workers, config.large_container_len);
        Ok(Self {
            poll,
            events: Events::with_capacity(max_events),
            ready_events: Vec::with_capacity(max_events),
            listener,
            connections: Vec::new(),
            idle: IdleQueue::new(),
            keyspace,
            registry: CommandRegistry::with_builtin_commands(),
            clock: MonotonicClock::new(),
            config,
        })
    }

    /// Local address of the bound listener.
    ///
    /// # Errors
    ///
    /// Returns `MayflyError::Io` when the address query fails.
    pub fn local_addr(&self) -> MayflyResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|error| MayflyError::Io(format!("query local address failed: {error}")))
    }

    /// Number of live connections.
    #[cfg(test)]
    fn connection_count(&self) -> usize {
        self.connections.iter().filter(|slot| slot.is_some()).count()
    }

    /// Runs the event loop forever.
    ///
    /// # Errors
    ///
    /// Returns `MayflyError::Io` when polling or socket registration fails.
    pub fn run(&mut self) -> MayflyResult<()> {
        loop {
            let _ = self.poll_once(self.next_timer_timeout())?;
        }
    }

    /// Processes one readiness cycle: poll, per-connection I/O, timers.
    ///
    /// # Errors
    ///
    /// Returns `MayflyError::Io` when polling or socket registration fails.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> MayflyResult<usize> {
        if let Err(error) = self.poll.poll(&mut self.events, timeout) {
            // A signal interrupting the wait restarts the cycle.
            if error.kind() == std::io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(MayflyError::Io(format!("poll wait failed: {error}")));
        }

        self.ready_events.clear();
        for event in &self.events {
            self.ready_events.push((
                event.token(),
                event.is_readable(),
                event.is_writable(),
                event.is_error(),
            ));
        }

        let ready_count = self.ready_events.len();
        for index in 0..ready_count {
            let (token, readable, writable, errored) = self.ready_events[index];
            if token == LISTENER_TOKEN {
                self.accept_new_connections()?;
                continue;
            }
            self.handle_connection_event(token, readable, writable, errored)?;
        }

        self.process_timers()?;
        Ok(ready_count)
    }

    // Next poll timeout from whichever timer source fires first: the idle
    // queue front or the earliest TTL deadline. `None` means wait forever.
    fn next_timer_timeout(&self) -> Option<Duration> {
        let mut deadline: Option<u64> = None;
        if let Some(slot) = self.idle.front() {
            if let Some(conn) = self.connections[slot].as_ref() {
                deadline = Some(
                    conn.last_active_ms
                        .saturating_add(self.config.idle_timeout_ms),
                );
            }
        }
        if let Some(expire_at) = self.keyspace.next_expiry_ms() {
            deadline = Some(deadline.map_or(expire_at, |current| current.min(expire_at)));
        }
        let deadline = deadline?;
        Some(Duration::from_millis(
            deadline.saturating_sub(self.clock.now_ms()),
        ))
    }

    fn accept_new_connections(&mut self) -> MayflyResult<()> {
        loop {
            match self.listener.accept() {
                Ok((mut socket, peer)) => {
                    let slot = self.allocate_slot();
                    let token = Token(CONNECTION_TOKEN_START + slot);
                    self.poll
                        .registry()
                        .register(&mut socket, token, Interest::READABLE)
                        .map_err(|error| {
                            MayflyError::Io(format!(
                                "register accepted connection in poll failed: {error}"
                            ))
                        })?;
                    let _ = socket.set_nodelay(true);
                    let now_ms = self.clock.now_ms();
                    self.connections[slot] = Some(ReactorConnection::new(socket, now_ms));
                    self.idle.push_back(&mut self.connections, slot);
                    tracing::info!("accepted connection from {peer}");
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(error) => {
                    tracing::warn!("accept connection failed: {error}");
                    return Ok(());
                }
            }
        }
    }

    fn allocate_slot(&mut self) -> usize {
        if let Some(slot) = self.connections.iter().position(Option::is_none) {
            return slot;
        }
        self.connections.push(None);
        self.connections.len() - 1
    }

    fn handle_connection_event(
        &mut self,
        token: Token,
        readable: bool,
        writable: bool,
        errored: bool,
    ) -> MayflyResult<()> {
        let Some(slot) = token.0.checked_sub(CONNECTION_TOKEN_START) else {
            return Ok(());
        };
        let Some(Some(_)) = self.connections.get(slot) else {
            return Ok(());
        };

        self.touch_idle(slot);
        let Some(mut conn) = self.connections[slot].take() else {
            return Ok(());
        };
        if readable && conn.want_read {
            Self::read_connection(&mut conn, &mut self.keyspace, &self.registry, &self.clock);
        }
        if writable && conn.want_write {
            Self::flush_writes(&mut conn);
        }
        let close = errored || conn.want_close;
        self.connections[slot] = Some(conn);

        if close {
            self.destroy_connection(slot)?;
            return Ok(());
        }
        self.refresh_connection_interest(slot)
    }

    // Any I/O event counts as activity: refresh the stamp and move the
    // connection to the idle-queue tail.
    fn touch_idle(&mut self, slot: usize) {
        let now_ms = self.clock.now_ms();
        if let Some(conn) = self.connections[slot].as_mut() {
            conn.last_active_ms = now_ms;
        }
        self.idle.detach(&mut self.connections, slot);
        self.idle.push_back(&mut self.connections, slot);
    }

    fn read_connection(
        conn: &mut ReactorConnection,
        keyspace: &mut Keyspace,
        registry: &CommandRegistry,
        clock: &MonotonicClock,
    ) {
        let mut chunk = [0_u8; READ_CHUNK_BYTES];
        loop {
            match conn.socket.read(&mut chunk) {
                Ok(0) => {
                    tracing::debug!("peer closed connection");
                    conn.want_close = true;
                    break;
                }
                Ok(read_len) => {
                    conn.parser.feed_bytes(&chunk[..read_len]);
                    if !Self::drain_requests(conn, keyspace, registry, clock) {
                        break;
                    }
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(error) => {
                    tracing::warn!("read from connection failed: {error}");
                    conn.want_close = true;
                    break;
                }
            }
        }
        // Opportunistic drain: most replies fit the socket buffer, so this
        // usually saves one poll round-trip per request.
        if !conn.outgoing.is_empty() {
            Self::flush_writes(conn);
        }
    }

    // Consumes every complete frame in the parser, appending one framed
    // reply per request. Returns `false` when the connection must close.
    fn drain_requests(
        conn: &mut ReactorConnection,
        keyspace: &mut Keyspace,
        registry: &CommandRegistry,
        clock: &MonotonicClock,
    ) -> bool {
        loop {
            match conn.parser.try_pop_frame() {
                Ok(Some(frame)) => {
                    let reply = registry.dispatch(&frame, keyspace, clock.now_ms());
                    append_response(&mut conn.outgoing, &reply);
                }
                Ok(None) => return true,
                Err(error) => {
                    tracing::warn!("closing connection on protocol violation: {error}");
                    conn.want_close = true;
                    return false;
                }
            }
        }
    }

    fn flush_writes(conn: &mut ReactorConnection) {
        while !conn.outgoing.is_empty() {
            match conn.socket.write(conn.outgoing.as_slice()) {
                Ok(0) => {
                    conn.want_close = true;
                    return;
                }
                Ok(written) => {
                    let _ = conn.outgoing.drain(..written);
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(error) => {
                    tracing::warn!("write to connection failed: {error}");
                    conn.want_close = true;
                    return;
                }
            }
        }
    }

    // Re-derives the read/write flags from the outbound buffer (exactly one
    // is set outside teardown) and re-registers the poll interest only when
    // it changed.
    fn refresh_connection_interest(&mut self, slot: usize) -> MayflyResult<()> {
        let token = Token(CONNECTION_TOKEN_START + slot);
        let registry = self.poll.registry();
        let Some(conn) = self.connections[slot].as_mut() else {
            return Ok(());
        };
        conn.want_write = !conn.outgoing.is_empty();
        conn.want_read = !conn.want_write;
        let next_interest = if conn.want_write {
            Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        if next_interest == conn.interest {
            return Ok(());
        }
        registry
            .reregister(&mut conn.socket, token, next_interest)
            .map_err(|error| {
                MayflyError::Io(format!("refresh connection poll interest failed: {error}"))
            })?;
        conn.interest = next_interest;
        Ok(())
    }

    fn destroy_connection(&mut self, slot: usize) -> MayflyResult<()> {
        self.idle.detach(&mut self.connections, slot);
        let Some(mut conn) = self.connections[slot].take() else {
            return Ok(());
        };
        self.poll
            .registry()
            .deregister(&mut conn.socket)
            .map_err(|error| {
                MayflyError::Io(format!("deregister closed connection failed: {error}"))
            })?;
        tracing::debug!("closed connection in slot {slot}");
        Ok(())
    }

    // Timer pass, run after every poll cycle: reap idle connections from
    // the queue front, then evict expired keys within the tick budget.
    fn process_timers(&mut self) -> MayflyResult<()> {
        let now_ms = self.clock.now_ms();
        while let Some(slot) = self.idle.front() {
            let Some(conn) = self.connections[slot].as_ref() else {
                break;
            };
            let deadline = conn
                .last_active_ms
                .saturating_add(self.config.idle_timeout_ms);
            if deadline >= now_ms {
                break;
            }
            tracing::info!("removing idle connection in slot {slot}");
            self.destroy_connection(slot)?;
        }

        let evicted = self
            .keyspace
            .evict_expired(now_ms, self.config.expiry_budget_per_tick);
        if evicted > 0 {
            tracing::debug!("evicted {evicted} expired keys");
        }
        Ok(())
    }
}
