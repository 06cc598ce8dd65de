//! Teamflow - an interactive CLI for standardized team Git/GitHub workflows
//!
//! Teamflow walks engineers through a shared development lifecycle: starting
//! work on a branch, continuing in-progress work, finishing with a commit,
//! push, and pull request, and inspecting overall team state. Every
//! externally-visible operation is guarded by pre-operation backups,
//! classified error handling, and automatic recovery.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to phases)
//! - [`phases`] - The five workflow state machines (start/continue/finish/team/help)
//! - [`core`] - Configuration, domain types, validators, paths, and logging
//! - [`git`] - Single doorway for all Git operations
//! - [`gateway`] - Rate-limited GitHub API access
//! - [`backup`] - Snapshot store with checksums and incremental backups
//! - [`recovery`] - Recovery strategies for recoverable failures
//! - [`errors`] - Error classification and process-level failure handling
//! - [`diagnosis`] - Repository diagnosis and work-status analysis
//! - [`notify`] - Team notification fanout (Slack, Discord)
//! - [`ui`] - User interaction utilities
//!
//! # Correctness Invariants
//!
//! 1. Phase state machines advance through total transition functions
//! 2. All Git mutations flow through the [`git::GitAdapter`]
//! 3. Mutating operations are preceded by a backup of tracked paths
//! 4. Destructive repairs require explicit user confirmation

pub mod backup;
pub mod cli;
pub mod core;
pub mod diagnosis;
pub mod errors;
pub mod gateway;
pub mod git;
pub mod notify;
pub mod phases;
pub mod recovery;
pub mod ui;
