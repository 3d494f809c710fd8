//! Lavalink node routing and REST dispatch.
//!
//! [`NodeRouter`] turns a cluster's shard range and assigned node set
//! into a deterministic preferred-node choice; [`LavalinkClient`] walks
//! router-ordered candidates until one node accepts the request.

pub mod client;
pub mod router;

pub use client::{
    HttpNodeApi, LavalinkClient, LavalinkNode, NodeApi, PlayTrack, PlayerDispatch, ResolvedTrack,
    TrackInfo, VoiceUpdate,
};
pub use router::{assign_nodes_to_clusters, NodeRouter};
