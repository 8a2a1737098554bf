//! # Overview
//!
//! The track and trackdir algebra: which rail edges exist inside a tile,
//! which directed edges they induce, and which of those connect across
//! tile boundaries.
//!
//! A [`Track`] is one of six undirected edges inside a tile; a [`Trackdir`]
//! adds a travel direction. Trackdir values 6 and 7 are deliberately unused
//! so that `trackdir & 7` recovers the track, and reversal is `trackdir ^
//! 8`. The lookup tables in this crate are the ground truth for graph
//! connectivity: pathfinding, signalling and vehicle movement all derive
//! their notion of "reachable" from them.

pub mod track;

pub use track::{
    diagdir_to_diag_trackdir, exitdir_reaches_trackdirs,
    signal_against_trackdir, signal_along_trackdir, signal_on_track,
    track_crosses_tracks, track_direction_to_trackdir,
    track_exitdir_to_trackdir, trackdir_crosses_trackdirs,
    trackdir_reaches_trackdirs, Track, TrackBits, Trackdir, TrackdirBits,
};
