//Might re-enable clippy::restriction later.
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    dead_code,
    clippy::cast_possible_truncation,
    clippy::use_self,
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::too_many_lines
)]
//! Bluetooth Mesh transport for a provisioner/configurator. Builds and parses network PDUs through
//! the Access, Upper Transport, Lower Transport and Network layers and tracks every outgoing
//! message until its status arrives.
//!
//! The layers are plain functions over byte buffers and can be used on their own. [`stack`] glues
//! them into a [`stack::handler::MeshMessageHandler`] and a session actor around it.

#[macro_use]
extern crate slog;

pub mod address;
pub mod crypto;
pub mod mesh;

pub mod access;
pub mod control;
pub mod lower;
pub mod net;
pub mod reassembler;
pub mod replay;
pub mod segmenter;
pub mod upper;

pub mod models;
pub mod stack;
