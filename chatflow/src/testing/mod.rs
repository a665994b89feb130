//! Test doubles and fixtures for chatflow pipelines.
//!
//! This module provides:
//! - In-memory backends implementing every collaborator trait
//! - Scripted stages (recording, failing, hanging, panicking)
//! - A ready-made [`ServiceContext`](crate::services::ServiceContext) and request fixtures

mod backends;
mod fixtures;
mod stages;

pub use backends::{
    MockAgentClient, MockBlobStorage, MockDocumentExtractor, MockRetrievalClient,
    MockTranscriptionClient, StubCompletionClient, StubToolRouter,
};
pub use fixtures::{chat_body, test_config, test_context, test_services, MockServices};
pub use stages::{CallLog, FailingStage, HangingStage, PanickingStage, RecordingStage, SlowStage};
