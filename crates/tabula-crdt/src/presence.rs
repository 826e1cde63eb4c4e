//! Presence bridge: ephemeral selections shared between participants.
//!
//! Presence never touches the replicated document. Each replica broadcasts
//! small [`PresenceUpdate`] messages over whatever transport carries document
//! updates, and folds the ones it receives into a per-cell projection of
//! remote cursors.
//!
//! Each peer stamps its own updates with a monotonically increasing clock;
//! an update is applied only if it is newer than what is held for that peer.
//! A `None` state is an explicit leave. Peers that go quiet for longer than
//! the configured timeout are dropped by [`PresenceBridge::expire_stale`].
//!
//! Selections are only projected once the bridge knows the table extent, and
//! always clipped to it, so a remote rectangle costs at most one entry per
//! table cell.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use tabula_types::{CellRef, PeerId, PresenceState, RemoteCursor, Selection, UserInfo};

use crate::flows::{OpSource, SharedTableFlowBus, Subscription, TableFlow};
use crate::store::TableStore;
use crate::Result;

/// Wire message for one participant's presence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub peer: PeerId,
    pub clock: u64,
    /// `None` means the peer left.
    pub state: Option<PresenceState>,
}

impl PresenceUpdate {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_stdvec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[derive(Clone, Debug)]
struct PeerEntry {
    clock: u64,
    state: PresenceState,
    seen_at: Instant,
}

/// Tracks local and remote presence and the remote-cursor projection.
pub struct PresenceBridge {
    local: PeerId,
    user: UserInfo,
    selection: Option<Selection>,
    clock: u64,

    peers: HashMap<PeerId, PeerEntry>,

    /// Cell → remote participants whose selection covers it.
    cursors: HashMap<CellRef, Vec<RemoteCursor>>,

    /// Table extent used to clip selections, as `(rows, cols)`. Nothing is
    /// projected while unknown.
    bounds: Option<(usize, usize)>,

    /// Document whose extent sets `bounds`, with its structural flows.
    table: Option<(TableStore, Subscription<TableFlow>)>,

    timeout: Duration,
    flows: SharedTableFlowBus,
}

impl PresenceBridge {
    pub fn new(local: PeerId, user: UserInfo, timeout: Duration, flows: SharedTableFlowBus) -> Self {
        Self {
            local,
            user,
            selection: None,
            clock: 0,
            peers: HashMap::new(),
            cursors: HashMap::new(),
            bounds: None,
            table: None,
            timeout,
            flows,
        }
    }

    /// A bridge whose bounds follow `store`, refreshed whenever a `table.*`
    /// flow is seen on `flows`.
    pub(crate) fn for_table(
        local: PeerId,
        user: UserInfo,
        timeout: Duration,
        flows: SharedTableFlowBus,
        store: TableStore,
    ) -> Self {
        let changes = flows.subscribe("table.*");
        let mut bridge = Self::new(local, user, timeout, flows);
        bridge.bounds = Some((store.row_count(), store.column_count()));
        bridge.table = Some((store, changes));
        bridge
    }

    pub fn local_peer(&self) -> PeerId {
        self.local
    }

    pub fn local_state(&self) -> PresenceState {
        PresenceState {
            user: self.user.clone(),
            selection: self.selection,
        }
    }

    // =========================================================================
    // Local side
    // =========================================================================

    /// Record a local selection change and return the message to broadcast.
    pub fn set_selection(&mut self, selection: Option<Selection>) -> Result<Vec<u8>> {
        self.selection = selection;
        self.next_update(Some(self.local_state()))
    }

    /// Change how this participant is drawn and return the message to broadcast.
    pub fn set_user(&mut self, user: UserInfo) -> Result<Vec<u8>> {
        self.user = user;
        self.next_update(Some(self.local_state()))
    }

    /// Re-announce the current state, e.g. on a heartbeat timer.
    pub fn heartbeat(&mut self) -> Result<Vec<u8>> {
        self.next_update(Some(self.local_state()))
    }

    /// Announce departure.
    pub fn leave(&mut self) -> Result<Vec<u8>> {
        self.selection = None;
        self.next_update(None)
    }

    fn next_update(&mut self, state: Option<PresenceState>) -> Result<Vec<u8>> {
        self.clock += 1;
        PresenceUpdate {
            peer: self.local,
            clock: self.clock,
            state,
        }
        .encode()
    }

    // =========================================================================
    // Remote side
    // =========================================================================

    /// Decode and apply a remote message. Returns whether the projection changed.
    pub fn apply_remote(&mut self, bytes: &[u8]) -> Result<bool> {
        let update = PresenceUpdate::decode(bytes)?;
        Ok(self.apply_update(update, Instant::now()))
    }

    /// Apply an already-decoded update observed at `now`.
    pub fn apply_update(&mut self, update: PresenceUpdate, now: Instant) -> bool {
        if update.peer == self.local {
            return false;
        }
        self.follow_table();
        if let Some(held) = self.peers.get(&update.peer) {
            if update.clock <= held.clock {
                tracing::trace!(peer = %update.peer.short(), clock = update.clock, "stale presence update");
                return false;
            }
        }

        match update.state {
            Some(state) => {
                self.peers.insert(
                    update.peer,
                    PeerEntry {
                        clock: update.clock,
                        state,
                        seen_at: now,
                    },
                );
            }
            None => {
                if self.peers.remove(&update.peer).is_none() {
                    return false;
                }
                tracing::debug!(peer = %update.peer.short(), "peer left");
            }
        }

        self.recompute();
        self.flows.publish(TableFlow::PresenceChanged {
            peers: vec![update.peer],
            source: OpSource::Remote,
        });
        true
    }

    /// Drop peers silent for longer than the timeout. Returns who was dropped.
    pub fn expire_stale(&mut self, now: Instant) -> Vec<PeerId> {
        let timeout = self.timeout;
        let mut expired: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.seen_at) > timeout)
            .map(|(peer, _)| *peer)
            .collect();
        if expired.is_empty() {
            return expired;
        }
        expired.sort();

        for peer in &expired {
            self.peers.remove(peer);
        }
        self.follow_table();
        tracing::debug!(count = expired.len(), "expired silent peers");
        self.recompute();
        self.flows.publish(TableFlow::PresenceChanged {
            peers: expired.clone(),
            source: OpSource::Remote,
        });
        expired
    }

    // =========================================================================
    // Projection
    // =========================================================================

    /// Clip remote selections to a table of this size.
    pub fn set_table_bounds(&mut self, rows: usize, cols: usize) {
        self.bounds = Some((rows, cols));
        self.recompute();
    }

    /// Current clipping extent, if known.
    pub fn table_bounds(&self) -> Option<(usize, usize)> {
        self.bounds
    }

    /// Re-read the table extent if the document changed shape since the last
    /// look, and reproject. Returns whether the bounds moved.
    ///
    /// Call on `table.*` flows; presence updates and expiry also do this.
    pub fn refresh_bounds(&mut self) -> bool {
        let changed = self.follow_table();
        if changed {
            self.recompute();
        }
        changed
    }

    fn follow_table(&mut self) -> bool {
        let Some((store, changes)) = &mut self.table else {
            return false;
        };
        if changes.drain().is_empty() {
            return false;
        }
        let bounds = Some((store.row_count(), store.column_count()));
        if bounds == self.bounds {
            return false;
        }
        self.bounds = bounds;
        true
    }

    /// Remote participants whose selection covers `cell`.
    pub fn cursors_at(&self, cell: CellRef) -> &[RemoteCursor] {
        self.cursors.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The full cell → cursors projection.
    pub fn projection(&self) -> &HashMap<CellRef, Vec<RemoteCursor>> {
        &self.cursors
    }

    /// Remote states currently held, ordered by peer.
    pub fn remote_states(&self) -> Vec<(PeerId, &PresenceState)> {
        let mut states: Vec<_> = self.peers.iter().map(|(p, e)| (*p, &e.state)).collect();
        states.sort_by_key(|(p, _)| *p);
        states
    }

    pub fn remote_count(&self) -> usize {
        self.peers.len()
    }

    fn recompute(&mut self) {
        self.cursors.clear();
        let Some((rows, cols)) = self.bounds else {
            tracing::trace!("presence: table extent unknown, not projecting");
            return;
        };

        let mut peers: Vec<(&PeerId, &PeerEntry)> = self.peers.iter().collect();
        peers.sort_by_key(|(p, _)| **p);

        for (peer, entry) in peers {
            let Some(selection) = entry.state.selection else {
                continue;
            };
            let Some(range) = selection.range().clamp_to(rows, cols) else {
                continue;
            };
            for cell in range.cells() {
                self.cursors.entry(cell).or_default().push(RemoteCursor {
                    peer: *peer,
                    user: entry.state.user.clone(),
                });
            }
        }
    }
}

impl std::fmt::Debug for PresenceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceBridge")
            .field("local", &self.local)
            .field("clock", &self.clock)
            .field("remote_peers", &self.peers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::shared_table_flow_bus;

    fn bridge(name: &str) -> PresenceBridge {
        let mut bridge = PresenceBridge::new(
            PeerId::new(),
            UserInfo::new(name, "#81b29a"),
            Duration::from_secs(30),
            shared_table_flow_bus(16),
        );
        bridge.set_table_bounds(8, 8);
        bridge
    }

    fn cell(row: usize, col: usize) -> CellRef {
        CellRef::new(row, col)
    }

    #[test]
    fn test_remote_selection_projects_to_cells() {
        let mut amy = bridge("amy");
        let mut bo = bridge("bo");

        let msg = amy
            .set_selection(Some(Selection::new(cell(0, 0), cell(1, 1))))
            .unwrap();
        assert!(bo.apply_remote(&msg).unwrap());

        assert_eq!(bo.projection().len(), 4);
        let here = bo.cursors_at(cell(1, 0));
        assert_eq!(here.len(), 1);
        assert_eq!(here[0].peer, amy.local_peer());
        assert_eq!(here[0].user.name, "amy");
        assert!(bo.cursors_at(cell(2, 0)).is_empty());
    }

    #[test]
    fn test_local_peer_is_excluded() {
        let mut amy = bridge("amy");
        let msg = amy.set_selection(Some(Selection::cursor(cell(0, 0)))).unwrap();
        assert!(!amy.apply_remote(&msg).unwrap());
        assert!(amy.projection().is_empty());
    }

    #[test]
    fn test_stale_updates_are_ignored() {
        let mut amy = bridge("amy");
        let mut bo = bridge("bo");

        let first = amy.set_selection(Some(Selection::cursor(cell(0, 0)))).unwrap();
        let second = amy.set_selection(Some(Selection::cursor(cell(3, 3)))).unwrap();

        assert!(bo.apply_remote(&second).unwrap());
        assert!(!bo.apply_remote(&first).unwrap());
        assert_eq!(bo.cursors_at(cell(3, 3)).len(), 1);
        assert!(bo.cursors_at(cell(0, 0)).is_empty());
    }

    #[test]
    fn test_overlapping_selections_stack() {
        let mut amy = bridge("amy");
        let mut cy = bridge("cy");
        let mut bo = bridge("bo");

        let a = amy.set_selection(Some(Selection::new(cell(0, 0), cell(0, 2)))).unwrap();
        let c = cy.set_selection(Some(Selection::cursor(cell(0, 1)))).unwrap();
        bo.apply_remote(&a).unwrap();
        bo.apply_remote(&c).unwrap();

        assert_eq!(bo.cursors_at(cell(0, 1)).len(), 2);
        assert_eq!(bo.cursors_at(cell(0, 2)).len(), 1);
    }

    #[test]
    fn test_leave_removes_peer() {
        let mut amy = bridge("amy");
        let mut bo = bridge("bo");
        let mut sub = bo.flows.subscribe("presence.changed");

        bo.apply_remote(&amy.set_selection(Some(Selection::cursor(cell(0, 0)))).unwrap())
            .unwrap();
        bo.apply_remote(&amy.leave().unwrap()).unwrap();

        assert_eq!(bo.remote_count(), 0);
        assert!(bo.projection().is_empty());
        assert_eq!(sub.drain().len(), 2);
    }

    #[test]
    fn test_expire_stale_peers() {
        let mut amy = bridge("amy");
        let mut bo = bridge("bo");
        let start = Instant::now();

        let msg = amy.set_selection(Some(Selection::cursor(cell(0, 0)))).unwrap();
        bo.apply_update(PresenceUpdate::decode(&msg).unwrap(), start);

        assert!(bo.expire_stale(start + Duration::from_secs(10)).is_empty());
        let expired = bo.expire_stale(start + Duration::from_secs(31));
        assert_eq!(expired, vec![amy.local_peer()]);
        assert!(bo.cursors_at(cell(0, 0)).is_empty());
    }

    #[test]
    fn test_bounds_clip_selection() {
        let mut amy = bridge("amy");
        let mut bo = bridge("bo");
        bo.set_table_bounds(2, 2);

        let msg = amy.set_selection(Some(Selection::new(cell(0, 0), cell(9, 9)))).unwrap();
        bo.apply_remote(&msg).unwrap();
        assert_eq!(bo.projection().len(), 4);
    }

    #[test]
    fn test_unknown_extent_projects_nothing() {
        let mut amy = bridge("amy");
        let mut bo = PresenceBridge::new(
            PeerId::new(),
            UserInfo::new("bo", "#e07a5f"),
            Duration::from_secs(30),
            shared_table_flow_bus(16),
        );

        let msg = amy
            .set_selection(Some(Selection::new(cell(0, 0), cell(3000, 3000))))
            .unwrap();
        assert!(bo.apply_remote(&msg).unwrap());
        assert_eq!(bo.remote_count(), 1);
        assert!(bo.projection().is_empty());

        bo.set_table_bounds(3, 2);
        assert_eq!(bo.projection().len(), 6);
    }

    #[test]
    fn test_document_bridge_follows_table_extent() {
        use crate::TableDocument;

        let mut doc = TableDocument::new("doc-1", PeerId::new()).unwrap();
        doc.insert_columns(0, 2).unwrap();
        doc.insert_rows(0, 2).unwrap();
        let mut bo = doc.presence_bridge(UserInfo::new("bo", "#e07a5f"));
        assert_eq!(bo.table_bounds(), Some((2, 2)));

        let mut amy = bridge("amy");
        let msg = amy
            .set_selection(Some(Selection::new(cell(0, 0), cell(3000, 3000))))
            .unwrap();
        bo.apply_remote(&msg).unwrap();
        assert_eq!(bo.projection().len(), 4);

        doc.delete_rows(&[1]).unwrap();
        assert!(bo.refresh_bounds());
        assert_eq!(bo.table_bounds(), Some((1, 2)));
        assert_eq!(bo.projection().len(), 2);
        assert!(!bo.refresh_bounds());
    }

    #[test]
    fn test_garbage_is_an_error() {
        let mut bo = bridge("bo");
        assert!(bo.apply_remote(&[0xff, 0xff, 0xff]).is_err());
    }
}
