// Station assignment coordinator.
//
// Turns the crossing set into charging-station assignments. It fires once
// per run, behind a one-shot latch:
//
//   Idle --on_crossing--> Awaiting --on_station (all answered)--> Done
//                              \------abandon (partial)---------/
//
// `on_crossing` asks for one station per user in the crossing set (in
// crossing order) and sets the latch. Answers arrive through `on_station`,
// one per `filteredlocations` event; answers that arrive while nothing is
// pending are dropped. When every request has been answered:
//
// - one user: `Assign { station, user }`
// - several users: one `AssignBatch` with positionally aligned lists
//
// How answers are paired with users in a batch is `StationCorrelation`:
// `LatestForAll` hands the most recent station to everyone, `InOrder` pairs
// the i-th answer with the i-th request. A user without a station at
// assignment time is skipped; a batch with nobody left is not emitted.
//
// The coordinator never waits and has no timeout. If no answer ever comes it
// stays in `Awaiting` until `abandon` or `rearm`.

use tracing::{debug, info};

use crate::config::StationCorrelation;
use crate::fleet::Fleet;
use crate::simulator::CrossingSet;
use crate::types::{Location, StationId, UserId};

/// Something the coordinator wants published.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    /// Ask the station finder for a station near `location` on behalf of
    /// `user`.
    RequestStation { user: UserId, location: Location },
    Assign { station: StationId, user: UserId },
    /// `stations[i]` is assigned to `users[i]`. Equal lengths, no user twice.
    AssignBatch {
        stations: Vec<StationId>,
        users: Vec<UserId>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Awaiting {
        requests: Vec<UserId>,
        answers: Vec<StationId>,
    },
    Done,
}

#[derive(Clone, Debug)]
pub struct StationCoordinator {
    phase: Phase,
    processed: bool,
    correlation: StationCorrelation,
}

impl StationCoordinator {
    pub fn new(correlation: StationCorrelation) -> Self {
        Self {
            phase: Phase::Idle,
            processed: false,
            correlation,
        }
    }

    /// React to a crossing. Only the first call with a non-empty set does
    /// anything; later calls return nothing until `rearm`.
    pub fn on_crossing(&mut self, crossing: &CrossingSet, fleet: &Fleet) -> Vec<Directive> {
        if self.processed || crossing.is_empty() {
            return Vec::new();
        }
        self.processed = true;

        let mut requests = Vec::with_capacity(crossing.len());
        let mut directives = Vec::with_capacity(crossing.len());
        for user_id in crossing.iter() {
            let Some(user) = fleet.user(user_id) else {
                debug!(user = %user_id, "crossed user not in fleet, skipping");
                continue;
            };
            requests.push(user.id.clone());
            directives.push(Directive::RequestStation {
                user: user.id.clone(),
                location: user.location.clone(),
            });
        }

        if requests.is_empty() {
            self.phase = Phase::Done;
        } else {
            info!(users = requests.len(), "requesting charging stations");
            self.phase = Phase::Awaiting {
                requests,
                answers: Vec::new(),
            };
        }
        directives
    }

    /// Record one station answer. Returns the assignment once every pending
    /// request has been answered.
    pub fn on_station(&mut self, station: StationId) -> Vec<Directive> {
        let Phase::Awaiting { requests, answers } = &mut self.phase else {
            debug!(%station, "station answer with no pending request, ignoring");
            return Vec::new();
        };
        answers.push(station);
        if answers.len() < requests.len() {
            return Vec::new();
        }
        self.assign()
    }

    /// Give up waiting: assign whatever has been answered so far. Nothing is
    /// emitted when no request was answered or nothing was pending.
    pub fn abandon(&mut self) -> Vec<Directive> {
        if !self.is_awaiting() {
            return Vec::new();
        }
        info!(
            users = self.pending_users().len(),
            "abandoning pending station requests"
        );
        self.assign()
    }

    /// Clear the latch so the next non-empty crossing set fires again.
    /// Drops any pending requests without assigning them.
    pub fn rearm(&mut self) {
        self.phase = Phase::Idle;
        self.processed = false;
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// True once `on_crossing` has fired this run.
    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.phase, Phase::Awaiting { .. })
    }

    /// Users of the outstanding request round, in request order.
    pub fn pending_users(&self) -> &[UserId] {
        match &self.phase {
            Phase::Awaiting { requests, .. } => requests,
            Phase::Idle | Phase::Done => &[],
        }
    }

    fn assign(&mut self) -> Vec<Directive> {
        let Phase::Awaiting { requests, answers } =
            std::mem::replace(&mut self.phase, Phase::Done)
        else {
            return Vec::new();
        };
        let batched = requests.len() > 1;
        let requested = requests.len();

        let (stations, users): (Vec<StationId>, Vec<UserId>) = match self.correlation {
            StationCorrelation::LatestForAll => match answers.last() {
                Some(latest) => requests
                    .into_iter()
                    .map(|user| (latest.clone(), user))
                    .unzip(),
                None => (Vec::new(), Vec::new()),
            },
            StationCorrelation::InOrder => answers.into_iter().zip(requests).unzip(),
        };

        if users.len() < requested {
            debug!(
                skipped = requested - users.len(),
                "users without a station left out of the assignment"
            );
        }

        if users.is_empty() {
            info!("no station resolved, nothing assigned");
            Vec::new()
        } else if batched {
            info!(users = users.len(), "assigning charging stations");
            vec![Directive::AssignBatch { stations, users }]
        } else {
            let station = stations.into_iter().next();
            let user = users.into_iter().next();
            match station.zip(user) {
                Some((station, user)) => {
                    info!(%station, %user, "assigning charging station");
                    vec![Directive::Assign { station, user }]
                }
                None => Vec::new(),
            }
        }
    }
}
