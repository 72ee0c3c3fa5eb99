//! Match session - binds two connections to one authoritative board

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::latency_ms;
use crate::ws::connection::{ConnRef, ConnectionEvent, ListenerId};
use crate::ws::protocol::{BoardSnapshot, MatchMsg, ServerMsg};

use super::board::{Board, BoardError, MoveMessage};
use super::MatchSettings;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Board(#[from] BoardError),

    #[error("{0} already joined this match")]
    DuplicateParticipant(String),

    #[error("{0} is not a player of this match")]
    NotAPlayer(String),
}

struct Participant {
    conn: ConnRef,
    listener: Option<ListenerId>,
}

/// One running match.
///
/// Lock order: `board` before `players`. Never acquire `board` while holding
/// `players`.
///
/// `decided` is only claimed while holding `board`, so exactly one outcome
/// (a winning move or a walkover) is ever announced.
pub struct MatchSession {
    id: Uuid,
    board: Mutex<Board>,
    players: Mutex<HashMap<String, Participant>>,
    decided: AtomicBool,
    finished: AtomicBool,
    exit_tx: mpsc::UnboundedSender<Uuid>,
}

impl MatchSession {
    /// Create a match for `connections`, bind them and send the welcome.
    ///
    /// Turn order follows the order of `connections`.
    pub fn start(
        id: Uuid,
        connections: Vec<ConnRef>,
        settings: &MatchSettings,
        exit_tx: mpsc::UnboundedSender<Uuid>,
    ) -> Result<Arc<Self>, SessionError> {
        let identities = connections
            .iter()
            .map(|c| c.identity().to_string())
            .collect();
        let board = Board::new(settings.board_height, settings.board_width, identities)?;

        let session = Arc::new(Self {
            id,
            board: Mutex::new(board),
            players: Mutex::new(HashMap::new()),
            decided: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            exit_tx,
        });

        for conn in connections {
            session.join(conn)?;
        }
        session.welcome();

        // A close that landed before our listener was installed reported to
        // nobody; settle it now.
        for conn in session.participants() {
            if !conn.is_open() {
                session.on_disconnect(&conn);
            }
        }

        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Connections still bound to this match
    pub fn participants(&self) -> Vec<ConnRef> {
        self.players.lock().values().map(|p| p.conn.clone()).collect()
    }

    /// Read access to the board, for status reporting
    pub fn with_board<R>(&self, f: impl FnOnce(&Board) -> R) -> R {
        f(&self.board.lock())
    }

    /// Bind a connection and start routing its events into this match
    pub fn join(self: &Arc<Self>, conn: ConnRef) -> Result<(), SessionError> {
        let identity = conn.identity().to_string();
        if !self.board.lock().players().contains(&identity) {
            return Err(SessionError::NotAPlayer(identity));
        }

        {
            let mut players = self.players.lock();
            if players.contains_key(&identity) {
                return Err(SessionError::DuplicateParticipant(identity));
            }
            players.insert(
                identity.clone(),
                Participant {
                    conn: conn.clone(),
                    listener: None,
                },
            );
        }

        let session: Weak<Self> = Arc::downgrade(self);
        let listener = conn.listen(Arc::new(move |conn: &ConnRef, event: ConnectionEvent| {
            let Some(session) = session.upgrade() else {
                return;
            };
            match event {
                ConnectionEvent::Closed => session.on_disconnect(conn),
                ConnectionEvent::Message(raw) => match serde_json::from_str::<MatchMsg>(&raw) {
                    Ok(msg) => session.process(conn, msg),
                    Err(e) => {
                        warn!(identity = %conn.identity(), error = %e, "Invalid match message");
                    }
                },
            }
        }));

        if let Some(participant) = self.players.lock().get_mut(&identity) {
            participant.listener = Some(listener);
        }
        Ok(())
    }

    /// Handle a parsed command from `conn`
    pub fn process(&self, conn: &ConnRef, msg: MatchMsg) {
        match msg {
            MatchMsg::Move { moves } => self.handle_moves(conn, &moves),
        }
    }

    fn handle_moves(&self, conn: &ConnRef, moves: &[MoveMessage]) {
        let identity = conn.identity();
        let winner = {
            let mut board = self.board.lock();
            if self.decided.load(Ordering::SeqCst) {
                debug!(match_id = %self.id, identity = %identity, "Move after match end ignored");
                return;
            }

            if let Err(err) = board.make_moves(identity, moves) {
                debug!(match_id = %self.id, identity = %identity, problem = %err, "Move rejected");
                if let Err(e) = conn.send_msg(&ServerMsg::from(&err)) {
                    warn!(identity = %identity, error = %e, "Failed to send move error");
                }
                return;
            }

            let winner = board.winner();
            if winner.is_some() {
                self.decided.store(true, Ordering::SeqCst);
            }
            let next = board.current_player().to_string();
            self.broadcast(|you, conn| ServerMsg::Update {
                board: BoardSnapshot::Update {
                    board: board.board_for(you),
                    fight: board.fights(you).to_vec(),
                },
                you: you.to_string(),
                next: next.clone(),
                winner: winner.clone(),
                ink: board.ink(you),
                ping: latency_ms(conn.ping()),
            });
            board.reset_fight_cache();
            winner
        };

        if let Some(winner) = winner {
            info!(match_id = %self.id, winner = %winner, "Match won");
            self.terminate();
        }
    }

    /// Drop a closed connection; the last one standing wins
    pub fn on_disconnect(&self, conn: &ConnRef) {
        let remaining: Vec<ConnRef> = {
            let mut players = self.players.lock();
            let Some(participant) = players.remove(conn.identity()) else {
                return;
            };
            if let Some(listener) = participant.listener {
                conn.remove(listener);
            }
            players.values().map(|p| p.conn.clone()).collect()
        };

        info!(match_id = %self.id, identity = %conn.identity(), "Player left match");

        {
            let board = self.board.lock();
            if self.decided.swap(true, Ordering::SeqCst) {
                return;
            }

            if let [survivor] = remaining.as_slice() {
                let you = survivor.identity();
                let msg = ServerMsg::Update {
                    board: BoardSnapshot::Update {
                        board: board.board_for(you),
                        fight: board.fights(you).to_vec(),
                    },
                    you: you.to_string(),
                    next: board.current_player().to_string(),
                    winner: Some(you.to_string()),
                    ink: board.ink(you),
                    ping: latency_ms(survivor.ping()),
                };
                if let Err(e) = survivor.send_msg(&msg) {
                    warn!(identity = %you, error = %e, "Failed to send walkover");
                }
                info!(match_id = %self.id, winner = %you, "Match won by walkover");
            }
        }

        self.terminate();
    }

    /// Send every participant its initial view of the board
    fn welcome(&self) {
        let board = self.board.lock();
        let players = board.players().to_vec();
        let next = board.current_player().to_string();

        self.broadcast(|you, conn| ServerMsg::Welcome {
            players: players.clone(),
            board: BoardSnapshot::Start {
                board: board.board_for(you),
            },
            you: you.to_string(),
            next: next.clone(),
            ink: board.ink(you),
            ping: latency_ms(conn.ping()),
        });

        info!(match_id = %self.id, players = ?players, "Match started");
    }

    /// Close the match: notify, detach listeners and report to matchmaking.
    ///
    /// Only the first call has any effect.
    pub fn terminate(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.decided.store(true, Ordering::SeqCst);

        {
            let mut players = self.players.lock();
            for participant in players.values_mut() {
                let msg = ServerMsg::Finish {
                    ping: latency_ms(participant.conn.ping()),
                };
                if let Err(e) = participant.conn.send_msg(&msg) {
                    debug!(identity = %participant.conn.identity(), error = %e, "Failed to send finish");
                }
                if let Some(listener) = participant.listener.take() {
                    participant.conn.remove(listener);
                }
            }
        }

        if self.exit_tx.send(self.id).is_err() {
            warn!(match_id = %self.id, "Matchmaking is gone, participants will not be recycled");
        }
        info!(match_id = %self.id, "Match finished");
    }

    fn broadcast(&self, build: impl Fn(&str, &ConnRef) -> ServerMsg) {
        let players = self.players.lock();
        for (identity, participant) in players.iter() {
            let msg = build(identity, &participant.conn);
            if let Err(e) = participant.conn.send_msg(&msg) {
                warn!(match_id = %self.id, identity = %identity, error = %e, "Failed to send to player");
            }
        }
    }
}
