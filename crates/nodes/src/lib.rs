//! Orchestration of the Bug Finder pipeline and the LLM-backed collaborators.
//!
//! This crate drives one log through intake, analysis, drafting, the
//! review–refinement loop, publication and notification, recording every step
//! in a [`pipeline::ProcessRecord`].
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The orchestrator sequences calls between the
//! business logic in the [`pipeline`] crate and the port traits it defines.
//! It contains no domain rules of its own beyond ordering, timeouts, retries
//! and cancellation.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`orchestrator`] | `ProcessOrchestrator` and the `Collaborators` bundle |
//! | [`retry`] | `RetryController` shared by publication and notification |
//! | [`gateway`] | `LlmGateway`: prompt in, typed JSON value out |
//! | [`collaborators`] | LLM-backed classifier, drafter, content reviewer and refiner |
//! | [`fallback`] | Rule-based classification used when the classifier fails |

pub mod collaborators;
pub mod fallback;
pub mod gateway;
pub mod orchestrator;
pub mod retry;

mod review_loop;
mod stage;

pub use collaborators::{LlmClassifier, LlmContentReviewer, LlmDrafter, LlmRefiner};
pub use fallback::conservative_classification;
pub use gateway::{extract_json, LlmGateway, DEFAULT_MAX_TOKENS};
pub use orchestrator::{Collaborators, ProcessOrchestrator};
pub use retry::{RetryController, RetryOutcome};
