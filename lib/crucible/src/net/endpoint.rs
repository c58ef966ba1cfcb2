use crate::net::connection::{Connection, ConnectionState};
use crate::net::support::NetworkResult;
use crate::table::Table;
use flint::logging;
use mio;
use mio::net::{TcpListener, TcpStream};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Token reserved for the listening socket; connection slot `n` maps to
/// token `n + 1`.
const LISTENER_TOKEN: mio::Token = mio::Token(0);
/// Readiness-wait ceiling. It bounds quiescence, not correctness: a timeout
/// wakes the loop without producing any work.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 1024;

/// Owns the listener, the connection slot table and the key space, and runs
/// the readiness loop that drives all of them on a single thread.
pub struct Endpoint {
    server: TcpListener,
    poll: mio::Poll,
    events: mio::Events,
    connections: Vec<Option<Connection<TcpStream>>>,
    free: Vec<usize>,
    table: Table,
    max_clients: usize,
    log: logging::Logger,
}

impl Endpoint {
    /// Binds the listener to the provided `<ip>:<port>` address and registers
    /// it on a fresh poll. The accepted streams inherit non-blocking mode
    /// from the mio listener.
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(
        address: &str,
        max_clients: usize,
        log: L,
    ) -> NetworkResult<Endpoint> {
        let log = match log.into() {
            Some(log) => log.new(logging::o!()),
            None => logging::Logger::root(logging::Discard, logging::o!()),
        };

        let poll = mio::Poll::new()?;
        let server = TcpListener::bind(&address.parse::<SocketAddr>()?)?;

        poll.register(
            &server,
            LISTENER_TOKEN,
            mio::Ready::readable(),
            mio::PollOpt::level(),
        )?;

        Ok(Endpoint {
            server,
            poll,
            events: mio::Events::with_capacity(EVENT_CAPACITY),
            connections: Vec::new(),
            free: Vec::new(),
            table: Table::new(),
            max_clients,
            log,
        })
    }

    /// The number of live connections.
    #[inline]
    pub fn client_count(&self) -> usize {
        self.connections.len() - self.free.len()
    }

    /// Runs the readiness loop until the process is terminated.
    pub fn run(&mut self) -> ! {
        loop {
            self.tick();
        }
    }

    /// One loop iteration: wait for readiness, accept at most one new
    /// client, drive the ready connections, reap anything that closed.
    pub fn tick(&mut self) {
        self.poll
            .poll(&mut self.events, Some(POLL_TIMEOUT))
            .expect("Readiness poll failed");

        let accept_ready = (&self.events)
            .into_iter()
            .any(|event| event.token() == LISTENER_TOKEN);

        if accept_ready {
            self.accept_one();
        }

        let events = &self.events;
        let connections = &mut self.connections;
        let free = &mut self.free;
        let table = &mut self.table;
        let poll = &self.poll;
        let log = &self.log;

        for event in events {
            let token = event.token();

            if token == LISTENER_TOKEN {
                continue;
            }

            let id = usize::from(token) - 1;

            let state = {
                let conn = match connections.get_mut(id).and_then(|slot| slot.as_mut()) {
                    Some(conn) => conn,
                    None => continue,
                };

                let before = conn.state();
                conn.drive(table);
                let after = conn.state();

                // Interest is a pure function of the state, so only a state
                // transition requires touching the registration.
                if after != ConnectionState::Closing && after != before {
                    conn.reregister(token, poll)
                        .expect("Stream reregistration failed");
                }

                after
            };

            if state == ConnectionState::Closing {
                if let Some(conn) = connections[id].take() {
                    conn.deregister(poll).expect("Stream deregistration failed");
                    free.push(id);
                    logging::debug!(log, "connection closed"; "connection_id" => id);
                }
            }
        }
    }

    /// Accept a single client. Level triggering re-arms the listener event,
    /// so a backlog is drained one connection per iteration.
    fn accept_one(&mut self) {
        match self.server.accept() {
            Ok((stream, peer)) => {
                if self.client_count() >= self.max_clients {
                    logging::warn!(self.log, "connection ceiling reached, dropping client";
                                   "peer" => %peer, "ceiling" => self.max_clients);
                    return;
                }

                let id = match self.free.pop() {
                    Some(id) => id,
                    None => {
                        self.connections.push(None);
                        self.connections.len() - 1
                    }
                };

                let conn = Connection::new(stream, id, &self.log);
                conn.register(mio::Token(id + 1), &self.poll)
                    .expect("Stream registration failed");

                logging::debug!(self.log, "connection accepted";
                                "connection_id" => id, "peer" => %peer);

                self.connections[id] = Some(conn);
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => (),
            Err(err) => {
                logging::error!(self.log, "accept failed"; "error" => %err);
            }
        }
    }
}
