//! Token lock engine
//!
//! Implementation of distributed mutual exclusion over a circulating token,
//! after the second Ricart-Agrawala algorithm: the peer with the smallest id
//! starts with the token; a peer that wants the lock stamps a request with
//! its logical clock and broadcasts it; whoever holds an idle token hands it
//! to the first peer after itself (in circular id order) whose request is
//! newer than the token's record of that peer's last turn.
//!
//! All mutable protocol state lives behind one mutex and every transition is
//! a single critical section. Outbound remote calls are made only after the
//! guard is dropped, so a blocked or reentrant remote call can never
//! deadlock the engine. Membership itself lives in the directory's own
//! concurrent map, outside this mutex; a peer that vanishes from the
//! directory mid-scan surfaces as a `get_peer` miss and is handled like a
//! failed delivery. A failed remote call prunes the target peer from
//! membership; a dead non-holder must never stall the rest of the cluster.

use std::{
    collections::{BTreeMap, VecDeque},
    ops::Bound,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use baton_api::{PeerDirectory, PeerId, TokenSnapshot};

use crate::model::{LockState, LockStatus};
use crate::stats::{LockStats, LockStatsCollector};

/// Mutable engine state, guarded by a single mutex
struct LockCore {
    state: LockState,
    /// Logical clock; bumped on acquire, release, and every inbound message
    time: u64,
    /// Highest request time seen per known peer (self included)
    requests: BTreeMap<PeerId, u64>,
    /// Token map, `Some` exactly while `state.has_token()`
    token: Option<BTreeMap<PeerId, u64>>,
    /// FIFO queue of blocked local acquirers
    waiters: VecDeque<oneshot::Sender<()>>,
    initialized: bool,
}

/// A local acquire that has to wait for the token
struct PendingAcquire {
    time: u64,
    rx: oneshot::Receiver<()>,
}

/// Per-peer distributed mutual exclusion engine
pub struct TokenLock {
    id: PeerId,
    directory: Arc<dyn PeerDirectory>,
    core: Mutex<LockCore>,
    stats: Arc<LockStatsCollector>,
}

impl TokenLock {
    pub fn new(id: PeerId, directory: Arc<dyn PeerDirectory>) -> Self {
        Self {
            id,
            directory,
            core: Mutex::new(LockCore {
                state: LockState::NoToken,
                time: 0,
                requests: BTreeMap::new(),
                token: None,
                waiters: VecDeque::new(),
                initialized: false,
            }),
            stats: Arc::new(LockStatsCollector::default()),
        }
    }

    pub fn local_id(&self) -> PeerId {
        self.id
    }

    pub fn stats(&self) -> LockStats {
        self.stats.snapshot()
    }

    /// Elect the initial token holder and seed the request vector.
    ///
    /// Must run exactly once, after the peer directory is fully populated
    /// and before any `acquire` call. The smallest known id starts with the
    /// token; everyone else starts without.
    pub fn initialize(&self) {
        let mut core = self.core.lock();
        if core.initialized {
            warn!("lock engine already initialized, ignoring");
            return;
        }

        let mut ids = self.directory.peer_ids();
        ids.push(self.id);
        ids.sort();
        ids.dedup();

        for id in &ids {
            core.requests.insert(*id, 0);
        }
        if ids.first() == Some(&self.id) {
            core.state = LockState::TokenPresent;
            core.token = Some(ids.iter().map(|id| (*id, 0)).collect());
            info!(peer = %self.id, "elected initial token holder");
        } else {
            core.state = LockState::NoToken;
        }
        core.initialized = true;
    }

    /// Block until the token is here and the critical section is entered.
    pub async fn acquire(&self) {
        let Some(pending) = self.begin_acquire() else {
            return;
        };
        self.broadcast_request(pending.time).await;
        // Woken exactly when the token is handed to this waiter, either by
        // an inbound give_token or by a local release ahead in the queue.
        // An Err means the engine dropped the sender, which it never does.
        let _ = pending.rx.await;
        self.stats.pending_dec();
    }

    /// `acquire` with a deadline. Returns whether the lock was taken.
    ///
    /// On expiry the broadcast request stays outstanding (the protocol has
    /// no withdrawal message), so the token will still be routed here at
    /// some point; the arrival path parks it and passes it on.
    pub async fn acquire_timeout(&self, timeout: Duration) -> bool {
        let Some(pending) = self.begin_acquire() else {
            return true;
        };
        self.broadcast_request(pending.time).await;
        match tokio::time::timeout(timeout, pending.rx).await {
            Ok(_) => {
                self.stats.pending_dec();
                true
            }
            Err(_) => {
                self.stats.pending_dec();
                self.stats.record_acquire_timeout();
                warn!(peer = %self.id, "acquire timed out, request left outstanding");
                false
            }
        }
    }

    /// Leave the critical section and pass the token on if someone wants it.
    ///
    /// Queued local acquirers are served first, FIFO; only when none remain
    /// does the forward scan offer the token to remote requesters.
    pub async fn release(&self) {
        let handed_locally = {
            let mut core = self.core.lock();
            core.time += 1;
            if core.state != LockState::TokenHeld {
                warn!(state = %core.state, "release without holding the lock, ignoring");
                return;
            }
            core.state = LockState::TokenPresent;
            Self::hand_to_local_waiter(&mut core)
        };
        self.stats.record_release();
        if handed_locally {
            self.stats.record_acquire();
            debug!(peer = %self.id, "token handed to next queued local acquirer");
            return;
        }
        self.try_forward().await;
    }

    /// Inbound `request_token` from a remote peer.
    pub async fn handle_request_token(&self, time: u64, requester: PeerId) {
        {
            let mut core = self.core.lock();
            core.time += 1;
            match core.requests.get_mut(&requester) {
                Some(entry) => *entry = (*entry).max(time),
                None => {
                    warn!(peer = %requester, "token request from unknown peer, ignoring");
                    return;
                }
            }
        }
        self.try_forward().await;
    }

    /// Inbound `give_token`: adopt the token.
    ///
    /// If a local acquire is still waiting, the front live waiter is woken
    /// and the critical section is entered on its behalf. Otherwise (for
    /// instance every waiter timed out) the token is parked and immediately
    /// re-offered to remote requesters.
    pub async fn handle_give_token(&self, snapshot: TokenSnapshot) {
        let parked = {
            let mut core = self.core.lock();
            core.time += 1;
            if core.state.has_token() {
                error!("received a token while already holding one, dropping duplicate");
                return;
            }

            let mut token = snapshot.decode();
            // Keep the token's key set in lockstep with current membership
            for id in core.requests.keys() {
                token.entry(*id).or_insert(0);
            }
            let known = &core.requests;
            token.retain(|id, _| known.contains_key(id));

            let requested = core.requests.get(&self.id).copied().unwrap_or(0);
            let granted = token.get(&self.id).copied().unwrap_or(0);
            core.token = Some(token);

            core.state = LockState::TokenPresent;
            let woken = requested > granted && Self::hand_to_local_waiter(&mut core);
            !woken
        };

        if parked {
            self.try_forward().await;
        } else {
            self.stats.record_acquire();
            debug!(peer = %self.id, "token obtained, critical section entered");
        }
    }

    /// Add a newly joined peer to the request vector (and token, if here).
    pub fn register_peer(&self, id: PeerId) {
        if id == self.id {
            warn!("cannot register self");
            return;
        }
        let mut core = self.core.lock();
        core.requests.entry(id).or_insert(0);
        if let Some(token) = core.token.as_mut() {
            token.entry(id).or_insert(0);
        }
    }

    /// Drop a departed peer from the request vector (and token, if here).
    pub fn unregister_peer(&self, id: PeerId) {
        if id == self.id {
            warn!("cannot unregister self");
            return;
        }
        let mut core = self.core.lock();
        core.requests.remove(&id);
        if let Some(token) = core.token.as_mut() {
            token.remove(&id);
        }
    }

    /// Shutdown path: never exit while holding the token.
    ///
    /// The normal forward runs first; if no peer has a qualifying request,
    /// the token is force-handed to the circular successor anyway (the new
    /// holder runs its own forward check on adoption). Only when no other
    /// peer remains does the token retire with the process.
    pub async fn destroy(&self) {
        {
            let mut core = self.core.lock();
            match core.state {
                LockState::NoToken => return,
                LockState::TokenHeld => {
                    warn!("destroy called while inside the critical section");
                    core.state = LockState::TokenPresent;
                }
                LockState::TokenPresent => {}
            }
            core.time += 1;
        }

        self.try_forward().await;

        loop {
            let Some((target, snapshot)) = self.detach_token_for_successor() else {
                return;
            };
            let Some(handle) = self.directory.get_peer(target) else {
                self.restore_token(&snapshot);
                self.prune_peer(target);
                continue;
            };
            match handle.give_token(snapshot.clone()).await {
                Ok(()) => {
                    self.stats.record_forced_transfer();
                    info!(peer = %target, "token force-transferred on shutdown");
                    return;
                }
                Err(e) => {
                    warn!(peer = %target, "forced transfer failed, trying next successor: {}", e);
                    self.restore_token(&snapshot);
                    self.prune_peer(target);
                }
            }
        }
    }

    /// Diagnostic snapshot, taken under the state guard. No side effects.
    pub fn status(&self) -> LockStatus {
        let core = self.core.lock();
        LockStatus {
            state: core.state,
            time: core.time,
            requests: core.requests.iter().map(|(id, t)| (*id, *t)).collect(),
            token: core.token.as_ref().map(TokenSnapshot::encode),
        }
    }

    /// Remove a peer everywhere after a failed delivery: engine maps,
    /// directory, and thereby any cached connection.
    pub fn prune_peer(&self, id: PeerId) {
        self.unregister_peer(id);
        self.directory.remove_peer(id);
        self.stats.record_pruned_peer();
        info!(peer = %id, "peer pruned from membership");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// First transition of `acquire`: enter directly when the token is
    /// here, otherwise stamp a request and join the waiter queue.
    fn begin_acquire(&self) -> Option<PendingAcquire> {
        let mut core = self.core.lock();
        core.time += 1;
        match core.state {
            LockState::TokenHeld => {
                warn!("acquire while already holding the lock, ignoring");
                None
            }
            LockState::TokenPresent => {
                core.state = LockState::TokenHeld;
                self.stats.record_acquire();
                debug!(peer = %self.id, "token already here, critical section entered");
                None
            }
            LockState::NoToken => {
                let time = core.time;
                let entry = core.requests.entry(self.id).or_insert(0);
                *entry = (*entry).max(time);
                let (tx, rx) = oneshot::channel();
                core.waiters.push_back(tx);
                self.stats.pending_inc();
                Some(PendingAcquire { time, rx })
            }
        }
    }

    /// Send `request_token` to every known remote peer, pruning the ones
    /// that cannot be reached.
    async fn broadcast_request(&self, time: u64) {
        for (id, handle) in self.directory.get_peers() {
            if let Err(e) = handle.request_token(time, self.id).await {
                warn!(peer = %id, "request_token delivery failed, pruning: {}", e);
                self.prune_peer(id);
            }
        }
    }

    /// Hand an idle token to the first qualifying requester, if any.
    ///
    /// The scan walks known ids in circular order starting right after self
    /// for one full cycle; the first id whose request is newer than the
    /// token's record for it gets the token. At most one peer receives it
    /// per invocation. A failed delivery prunes the target, restores the
    /// token, and rescans; this terminates because membership shrinks.
    async fn try_forward(&self) {
        loop {
            let Some((target, snapshot)) = self.detach_token_for_requester() else {
                return;
            };
            let Some(handle) = self.directory.get_peer(target) else {
                self.restore_token(&snapshot);
                self.prune_peer(target);
                continue;
            };
            match handle.give_token(snapshot.clone()).await {
                Ok(()) => {
                    self.stats.record_forward();
                    debug!(peer = %target, "token forwarded");
                    self.rebroadcast_if_waiting().await;
                    return;
                }
                Err(e) => {
                    warn!(peer = %target, "give_token delivery failed, pruning: {}", e);
                    self.restore_token(&snapshot);
                    self.prune_peer(target);
                }
            }
        }
    }

    /// Under the guard: pick the forward target and detach the token.
    fn detach_token_for_requester(&self) -> Option<(PeerId, TokenSnapshot)> {
        let mut core = self.core.lock();
        if core.state != LockState::TokenPresent {
            return None;
        }
        let target = {
            let token = core.token.as_ref()?;
            let after = core
                .requests
                .range((Bound::Excluded(self.id), Bound::Unbounded));
            let before = core.requests.range(..self.id);
            after
                .chain(before)
                .find(|(id, requested)| **requested > token.get(id).copied().unwrap_or(0))
                .map(|(id, _)| *id)?
        };
        Some((target, Self::detach_token(&mut core, self.id)?))
    }

    /// Under the guard: detach the token for the circular successor of
    /// self, qualifying request or not. `None` when self is the last peer.
    fn detach_token_for_successor(&self) -> Option<(PeerId, TokenSnapshot)> {
        let mut core = self.core.lock();
        if core.state != LockState::TokenPresent {
            return None;
        }
        let successor = core
            .requests
            .range((Bound::Excluded(self.id), Bound::Unbounded))
            .chain(core.requests.range(..self.id))
            .map(|(id, _)| *id)
            .next();
        let Some(target) = successor else {
            info!("no other peers remain, token retires with the process");
            core.token = None;
            core.state = LockState::NoToken;
            return None;
        };
        Some((target, Self::detach_token(&mut core, self.id)?))
    }

    /// Refresh the local entry to the current clock, clear the local token,
    /// and produce the wire snapshot. Caller has already picked the target.
    fn detach_token(core: &mut LockCore, local: PeerId) -> Option<TokenSnapshot> {
        let Some(mut token) = core.token.take() else {
            error!("token missing while in token_present state");
            return None;
        };
        token.insert(local, core.time);
        core.state = LockState::NoToken;
        Some(TokenSnapshot::encode(&token))
    }

    /// Wake the front live waiter and enter the critical section on its
    /// behalf. Caller must have the token here (`TokenPresent`). Dead
    /// waiters (timed-out acquires) are discarded along the way.
    fn hand_to_local_waiter(core: &mut LockCore) -> bool {
        while let Some(tx) = core.waiters.pop_front() {
            if tx.send(()).is_ok() {
                core.state = LockState::TokenHeld;
                return true;
            }
        }
        false
    }

    /// Failed delivery: the token never left, take it back. A local waiter
    /// queued meanwhile gets it straight away.
    fn restore_token(&self, snapshot: &TokenSnapshot) {
        let mut core = self.core.lock();
        core.token = Some(snapshot.decode());
        core.state = LockState::TokenPresent;
        if Self::hand_to_local_waiter(&mut core) {
            self.stats.record_acquire();
        }
    }

    /// After handing the token away with local waiters still queued: the
    /// forward refreshed `token[self]`, which masked their earlier request
    /// mark, so stamp and broadcast a fresh one on their behalf.
    async fn rebroadcast_if_waiting(&self) {
        let time = {
            let mut core = self.core.lock();
            core.waiters.retain(|tx| !tx.is_closed());
            if core.waiters.is_empty() {
                None
            } else {
                core.time += 1;
                let time = core.time;
                let entry = core.requests.entry(self.id).or_insert(0);
                *entry = (*entry).max(time);
                Some(time)
            }
        };
        if let Some(time) = time {
            self.broadcast_request(time).await;
        }
    }
}
