//! # Almox Architecture
//!
//! Almox keeps the books of a small warehouse (an *almoxarifado*): the stock
//! ledger, the stock-in and stock-out journals, and the personal protective
//! equipment (EPI) handed to collaborators. Everything lives in flat CSV files
//! that a spreadsheet can open.
//!
//! It is a library first: the `almox` binary is one client of it.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI Layer (main.rs, args.rs)                               │
//! │  - Parses arguments, asks for confirmation, prints results  │
//! │  - The ONLY place that knows about stdout/stderr/exit codes │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API Layer (api.rs)                                         │
//! │  - Thin facade over commands                                │
//! │  - Binds the operator, the code seed and the backup clock   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Command Layer (commands/*.rs)                              │
//! │  - Ledger, journals, EPIs, backups, reports, repair         │
//! │  - Returns CmdResult: rows, step statuses, messages         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Layer (store/, codec.rs)                           │
//! │  - Store<B>: typed tables over a StorageBackend             │
//! │  - FsBackend (production), MemBackend (testing)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reads degrade, writes refuse
//!
//! A table that cannot be parsed reads as empty with a warning, so listing and
//! reporting keep working. Any operation that would rewrite such a table fails
//! instead, so a damaged file is never replaced by an empty one.
//!
//! ## Multi-file operations
//!
//! Recording a movement touches several files. Steps run in a fixed order;
//! only the first one can abort the operation. Later failures come back as
//! failed [`commands::StepStatus`] entries plus a warning, and nothing is rolled
//! back.
//!
//! ## Module Overview
//!
//! - [`api`]: The API facade, entry point for all operations
//! - [`commands`]: Business logic for each operation
//! - [`store`]: Storage abstraction and implementations
//! - [`codec`]: CSV rows to typed records and back
//! - [`reflist`]: The list-in-a-cell format of the `NF/PEDIDO` column
//! - [`model`]: Tables, records and file layout
//! - [`validation`]: Operator input checks
//! - [`config`]: Configuration management
//! - [`error`]: Error types

pub mod api;
pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod model;
pub mod reflist;
pub mod store;
pub mod validation;
