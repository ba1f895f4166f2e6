use crate::packet::Packet;

/// Hands a frame to the transport for delivery to the peer.
///
/// Called from the arrival path and from the receiver's drain thread, so it
/// must be cheap and must not block. Implementations must not call back into
/// the window that invoked them.
pub trait PacketSink: Send + Sync {
    fn send_packet(&self, packet: Packet);
}

/// Hands an in-order data frame to the application.
///
/// Same constraints as [`PacketSink`]: fast, non-blocking, no re-entry.
pub trait PacketOutput: Send + Sync {
    fn output_packet(&self, packet: Packet);
}

impl<F> PacketSink for F
where
    F: Fn(Packet) + Send + Sync,
{
    fn send_packet(&self, packet: Packet) {
        self(packet)
    }
}

impl<F> PacketOutput for F
where
    F: Fn(Packet) + Send + Sync,
{
    fn output_packet(&self, packet: Packet) {
        self(packet)
    }
}
