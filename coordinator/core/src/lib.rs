// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PlantMesh Coordinator Core
//!
//! Agent event & workflow coordination engine for the PlantMesh
//! manufacturing-operations platform: the publish/subscribe event bus with
//! admission control and loop prevention, the agent-to-agent request
//! correlation layer, and the fixed three-step production workflow.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Coordination primitives consumed by the CLI and adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
