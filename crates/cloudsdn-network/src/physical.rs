//! Physical links and per-flow channel admission.

use indexmap::IndexMap;

use crate::element::ElementId;

/// Index of a physical link within the datacenter arena.
pub type LinkId = usize;

const BITS_PER_MEGABIT: f64 = 1e6;

/// A bandwidth capacity counter supporting reservation checks.
#[derive(Clone, Debug, serde::Serialize)]
pub struct Bandwidth {
    capacity: f64,
    allocated: f64,
}

impl Bandwidth {
    /// Creates a counter with the given capacity in Mb/s.
    pub fn new(capacity: f64) -> Self {
        Self { capacity, allocated: 0. }
    }

    /// Returns the total capacity in Mb/s.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Returns the currently committed amount in Mb/s.
    pub fn allocated(&self) -> f64 {
        self.allocated
    }

    /// Returns the currently available amount in Mb/s.
    pub fn available(&self) -> f64 {
        self.capacity - self.allocated
    }

    /// Checks whether the requested amount is currently available.
    pub fn is_amount_available(&self, amount: f64) -> bool {
        amount <= self.available()
    }

    /// Commits the requested amount. Returns `false` and leaves the counter
    /// unchanged if the amount is not available.
    pub fn allocate(&mut self, amount: f64) -> bool {
        if !self.is_amount_available(amount) {
            return false;
        }
        self.allocated += amount;
        true
    }

    /// Releases a previously committed amount.
    pub fn deallocate(&mut self, amount: f64) {
        self.allocated = (self.allocated - amount).max(0.);
    }
}

/// An admitted bandwidth reservation for one flow on one physical link.
///
/// Tracks the last time the channel was charged so byte accounting can
/// compute the amount passed since the previous use.
#[derive(Clone, Debug, serde::Serialize)]
pub struct Channel {
    flow_id: u64,
    bandwidth: f64,
    previous_time: f64,
}

impl Channel {
    /// Creates a channel for the given flow with the virtual link's required
    /// bandwidth in Mb/s.
    pub fn new(flow_id: u64, bandwidth: f64) -> Self {
        Self {
            flow_id,
            bandwidth,
            previous_time: -1.,
        }
    }

    /// Returns the flow id this channel belongs to.
    pub fn flow_id(&self) -> u64 {
        self.flow_id
    }

    /// Returns the admitted per-flow bandwidth in Mb/s.
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Returns the admitted per-flow rate in bits per second.
    pub fn rate_bps(&self) -> f64 {
        self.bandwidth * BITS_PER_MEGABIT
    }

    /// Returns the previous time this channel was charged,
    /// or a negative value if it was never used.
    pub fn previous_time(&self) -> f64 {
        self.previous_time
    }

    /// Returns the amount of bytes that passed through this channel since the
    /// last charge and advances the charge time.
    ///
    /// The first charge returns one second's worth of bytes at the admitted rate.
    pub fn amount_to_be_processed(&mut self, time: f64) -> u64 {
        let bytes_per_sec = self.rate_bps() / 8.;
        if self.previous_time < 0. {
            self.previous_time = time;
            bytes_per_sec.round() as u64
        } else {
            let time_spent = time - self.previous_time;
            self.previous_time = time;
            (time_spent * bytes_per_sec).round() as u64
        }
    }
}

/// A directed edge between two network elements carrying a [`Bandwidth`]
/// resource and the channels admitted onto it.
///
/// Links are created once during routing-table construction and shared by
/// index between the two endpoints' tables.
pub struct PhysicalLink {
    src: ElementId,
    dst: ElementId,
    bandwidth: Bandwidth,
    latency: f64,
    channels: IndexMap<u64, Channel>,
}

impl PhysicalLink {
    /// Creates a link with the given capacity in Mb/s and zero latency.
    pub fn new(src: ElementId, dst: ElementId, bandwidth: f64) -> Self {
        Self::with_latency(src, dst, bandwidth, 0.)
    }

    /// Creates a link with the given capacity in Mb/s and latency in seconds,
    /// usually copied from the topology description.
    pub fn with_latency(src: ElementId, dst: ElementId, bandwidth: f64, latency: f64) -> Self {
        Self {
            src,
            dst,
            bandwidth: Bandwidth::new(bandwidth),
            latency,
            channels: IndexMap::new(),
        }
    }

    /// Returns the source element.
    pub fn src(&self) -> ElementId {
        self.src
    }

    /// Returns the destination element.
    pub fn dst(&self) -> ElementId {
        self.dst
    }

    /// Returns the link latency in seconds.
    pub fn latency(&self) -> f64 {
        self.latency
    }

    /// Returns the link bandwidth counter.
    pub fn bandwidth(&self) -> &Bandwidth {
        &self.bandwidth
    }

    /// Admits a channel onto this link.
    ///
    /// Succeeds iff the channel's bandwidth is currently available; on success
    /// the channel is registered under its flow id and the reservation is
    /// committed. On failure nothing is mutated. This is the single
    /// synchronization point preventing oversubscription of a physical link.
    ///
    /// A flow that already holds a channel on this link keeps its existing
    /// reservation, so repeated deployments do not commit bandwidth twice.
    pub fn add_channel(&mut self, channel: Channel) -> bool {
        if self.channels.contains_key(&channel.flow_id()) {
            return true;
        }
        if !self.bandwidth.allocate(channel.bandwidth()) {
            return false;
        }
        self.channels.insert(channel.flow_id(), channel);
        true
    }

    /// Removes the channel of the given flow and releases its reservation.
    pub fn remove_channel(&mut self, flow_id: u64) -> Option<Channel> {
        let channel = self.channels.shift_remove(&flow_id)?;
        self.bandwidth.deallocate(channel.bandwidth());
        Some(channel)
    }

    /// Returns the channel of the given flow, if admitted.
    pub fn channel(&self, flow_id: u64) -> Option<&Channel> {
        self.channels.get(&flow_id)
    }

    /// Returns the mutable channel of the given flow, if admitted.
    pub fn channel_mut(&mut self, flow_id: u64) -> Option<&mut Channel> {
        self.channels.get_mut(&flow_id)
    }

    /// Returns the number of admitted channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Iterates over the admitted channels.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_commits_reservation() {
        let mut link = PhysicalLink::new(0, 1, 1000.);
        assert!(link.add_channel(Channel::new(1, 600.)));
        assert_eq!(link.bandwidth().available(), 400.);
        assert!(!link.add_channel(Channel::new(2, 500.)));
        // rejected admission leaves existing channels unchanged
        assert_eq!(link.channel_count(), 1);
        assert_eq!(link.bandwidth().available(), 400.);
        assert!(link.add_channel(Channel::new(3, 400.)));
        assert_eq!(link.bandwidth().available(), 0.);
    }

    #[test]
    fn readmission_of_the_same_flow_is_a_noop() {
        let mut link = PhysicalLink::new(0, 1, 1000.);
        assert!(link.add_channel(Channel::new(1, 600.)));
        assert!(link.add_channel(Channel::new(1, 600.)));
        assert_eq!(link.channel_count(), 1);
        assert_eq!(link.bandwidth().allocated(), 600.);
    }

    #[test]
    fn removing_channel_releases_bandwidth() {
        let mut link = PhysicalLink::new(0, 1, 100.);
        assert!(link.add_channel(Channel::new(1, 100.)));
        assert!(!link.add_channel(Channel::new(2, 1.)));
        link.remove_channel(1);
        assert!(link.add_channel(Channel::new(2, 1.)));
    }

    #[test]
    fn channel_byte_accounting() {
        let mut channel = Channel::new(1, 8.);
        // first charge returns one second's worth of bytes
        assert_eq!(channel.amount_to_be_processed(5.), 1_000_000);
        assert_eq!(channel.amount_to_be_processed(5.5), 500_000);
        assert_eq!(channel.previous_time(), 5.5);
    }
}
