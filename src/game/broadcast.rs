//! Fan-out to room members
//!
//! Recipients are copied out of the room under its lock; frames are queued
//! after the lock is released. Queuing never blocks: reliable handles kick a
//! peer whose queue is full, transform endpoints drop their oldest snapshot.

use bytes::Bytes;
use tracing::error;

use super::registry::Registry;
use crate::udp::endpoint::TransformEndpoint;
use crate::ws::outbound::ReliableHandle;
use crate::ws::protocol::{Frame, ServerMsg};

fn encode(msg: &ServerMsg) -> Option<Frame> {
    match msg.encode() {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(error = %e, "Failed to encode server message");
            None
        }
    }
}

pub fn send_to(recipient: &ReliableHandle, msg: &ServerMsg) {
    if let Some(frame) = encode(msg) {
        recipient.send(&frame);
    }
}

pub fn send_all(recipients: &[ReliableHandle], msg: &ServerMsg) {
    if let Some(frame) = encode(msg) {
        relay_all(recipients, &frame);
    }
}

pub fn relay_all(recipients: &[ReliableHandle], frame: &Frame) {
    for recipient in recipients {
        recipient.send(frame);
    }
}

/// Send to every member of `room_code` holding a live reliable channel.
/// Unknown rooms are ignored.
pub fn broadcast_reliable(registry: &Registry, room_code: &str, msg: &ServerMsg) {
    if let Some(recipients) = registry.with_room(room_code, |room| room.reliable_recipients()) {
        send_all(&recipients, msg);
    }
}

/// Relay an inbound event's text verbatim to the whole room
pub fn broadcast_raw(registry: &Registry, room_code: &str, frame: &Frame) {
    if let Some(recipients) = registry.with_room(room_code, |room| room.reliable_recipients()) {
        relay_all(&recipients, frame);
    }
}

/// Send over the loss-tolerant channel to every member with a known endpoint
pub fn broadcast_unreliable(registry: &Registry, room_code: &str, msg: &ServerMsg) {
    if let Some(recipients) = registry.with_room(room_code, |room| room.transform_recipients()) {
        push_all(&recipients, msg);
    }
}

pub fn push_all(recipients: &[TransformEndpoint], msg: &ServerMsg) {
    if let Some(frame) = encode(msg) {
        let datagram = Bytes::copy_from_slice(frame.as_bytes());
        for recipient in recipients {
            recipient.push(datagram.clone());
        }
    }
}
