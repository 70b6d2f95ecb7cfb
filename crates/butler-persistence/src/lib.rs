//! SQLite schema and repositories for every entity in the data model
//! (spec §3): guests, reservations, conversations, messages, tasks,
//! automation rules/executions, extension configs, audit entries, and
//! knowledge base entries.

pub mod error;
pub mod models;
pub mod repo;
pub mod schema;

pub use error::{PersistenceError, Result};

use std::path::Path;

use repo::audit::AuditRepository;
use repo::conversations::ConversationRepository;
use repo::executions::ExecutionRepository;
use repo::extension_configs::ExtensionConfigRepository;
use repo::guests::GuestRepository;
use repo::knowledge::KnowledgeRepository;
use repo::messages::MessageRepository;
use repo::reservations::ReservationRepository;
use repo::rules::RuleRepository;
use repo::tasks::TaskRepository;

/// One repository per entity, each owning its own connection guarded by a
/// `Mutex` (spec §5: "the persistence layer serializes writes through a
/// single relational store"). Bundled here so every crate above persistence
/// constructs its dependencies from one call.
pub struct Repositories {
    pub guests: GuestRepository,
    pub reservations: ReservationRepository,
    pub conversations: ConversationRepository,
    pub messages: MessageRepository,
    pub tasks: TaskRepository,
    pub rules: RuleRepository,
    pub executions: ExecutionRepository,
    pub extension_configs: ExtensionConfigRepository,
    pub audit: AuditRepository,
    pub knowledge: KnowledgeRepository,
}

impl Repositories {
    /// Open (or create) the database file at `path`, apply pragmas, run the
    /// idempotent schema creation, and open one connection per repository.
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        Ok(Self {
            guests: GuestRepository::new(schema::open_path(path)?),
            reservations: ReservationRepository::new(schema::open_path(path)?),
            conversations: ConversationRepository::new(schema::open_path(path)?),
            messages: MessageRepository::new(schema::open_path(path)?),
            tasks: TaskRepository::new(schema::open_path(path)?),
            rules: RuleRepository::new(schema::open_path(path)?),
            executions: ExecutionRepository::new(schema::open_path(path)?),
            extension_configs: ExtensionConfigRepository::new(schema::open_path(path)?),
            audit: AuditRepository::new(schema::open_path(path)?),
            knowledge: KnowledgeRepository::new(schema::open_path(path)?),
        })
    }

    /// In-memory database shared by every repository — for tests and the
    /// echo-responder demo mode.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Ok(Self {
            guests: GuestRepository::new(schema::open_in_memory()?),
            reservations: ReservationRepository::new(schema::open_in_memory()?),
            conversations: ConversationRepository::new(schema::open_in_memory()?),
            messages: MessageRepository::new(schema::open_in_memory()?),
            tasks: TaskRepository::new(schema::open_in_memory()?),
            rules: RuleRepository::new(schema::open_in_memory()?),
            executions: ExecutionRepository::new(schema::open_in_memory()?),
            extension_configs: ExtensionConfigRepository::new(schema::open_in_memory()?),
            audit: AuditRepository::new(schema::open_in_memory()?),
            knowledge: KnowledgeRepository::new(schema::open_in_memory()?),
        })
    }
}
