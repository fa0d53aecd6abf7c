//! SQL-based storage for groups, memberships and events

use super::super::error::StoreError;
use super::super::event::{Event, EventKind, EventSubject};
use super::super::group::{Group, GroupKind, ThreadKind, ThreadRef};
use super::super::hierarchy::GroupHierarchy;
use super::super::membership::{Membership, NewMembership};
use super::super::store::{EventEmitter, GroupStore, MembershipStore};
use super::super::types::{EventId, GroupId, MembershipId, ThreadId, Timestamp, UserId};
use crate::config::StoreConfig;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Params, Row, ToSql, Transaction, TransactionBehavior};

macro_rules! blob_id_sql {
    ($($ty:ty),*) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(&self.as_bytes()[..]))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    let bytes = value.as_blob()?;
                    <[u8; 32]>::try_from(bytes)
                        .map(<$ty>::from_bytes)
                        .map_err(|_| {
                            FromSqlError::Other(
                                format!("expected 32-byte id, got {} bytes", bytes.len()).into(),
                            )
                        })
                }
            }
        )*
    };
}

blob_id_sql!(GroupId, MembershipId, EventId, ThreadId);

impl ToSql for UserId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for UserId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        String::column_result(value).map(UserId)
    }
}

impl ToSql for Timestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0 as i64))
    }
}

impl FromSql for Timestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(|millis| Timestamp(millis.max(0) as u64))
    }
}

impl ToSql for ThreadKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ThreadKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ThreadKind::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown thread kind: {}", s).into()))
    }
}

impl FromSql for EventKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        EventKind::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown event kind: {}", s).into()))
    }
}

fn corrupt(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

const GROUP_COLUMNS: &str = "id, parent_id, name, kind, thread_kind, thread_id, created_at";

const MEMBERSHIP_COLUMNS: &str =
    "id, group_id, user_id, inviter_id, admin, accepted_at, experiences, created_at";

const EVENT_COLUMNS: &str = "id, kind, actor_id, subject_kind, subject_id, created_at";

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    let kind: String = row.get(3)?;
    let kind = match kind.as_str() {
        "formal" => GroupKind::Formal,
        "guest" => GroupKind::Guest {
            thread: ThreadRef {
                kind: row.get(4)?,
                id: row.get(5)?,
            },
        },
        other => return Err(corrupt(3, format!("unknown group kind: {}", other))),
    };

    Ok(Group {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        name: row.get(2)?,
        kind,
        created_at: row.get(6)?,
    })
}

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<Membership> {
    let experiences: String = row.get(6)?;
    let experiences = serde_json::from_str(&experiences)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(Membership {
        id: row.get(0)?,
        group_id: row.get(1)?,
        user_id: row.get(2)?,
        inviter_id: row.get(3)?,
        admin: row.get(4)?,
        accepted_at: row.get(5)?,
        experiences,
        created_at: row.get(7)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let subject_kind: String = row.get(3)?;
    let subject_id: Vec<u8> = row.get(4)?;
    let subject = <[u8; 32]>::try_from(subject_id.as_slice())
        .ok()
        .and_then(|bytes| EventSubject::from_parts(&subject_kind, bytes))
        .ok_or_else(|| corrupt(3, format!("bad event subject: {}", subject_kind)))?;

    Ok(Event {
        id: row.get(0)?,
        kind: row.get(1)?,
        actor_id: row.get(2)?,
        subject,
        created_at: row.get(5)?,
    })
}

/// SQL-based storage for groups, memberships and events
///
/// All access goes through [`transaction`](Self::transaction) or
/// [`read`](Self::read), which hand out a [`SqlTxn`] implementing the storage
/// traits.
#[derive(Clone)]
pub struct MembershipSqlStore {
    pool: Pool<SqliteConnectionManager>,
}

impl MembershipSqlStore {
    /// Wrap an existing pool, running pending migrations
    ///
    /// Connections must have `foreign_keys` enabled.
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, StoreError> {
        super::migrations::migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open the store described by `config`
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let Some(path) = &config.database_path else {
            return Self::memory();
        };

        let busy_timeout = config.busy_timeout;
        let enable_wal = config.enable_wal;
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if enable_wal {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .build(manager)?;

        tracing::info!(path = %path.display(), "Opened membership store");
        Self::new(pool)
    }

    /// Create a new in-memory store
    ///
    /// Every pooled connection to `:memory:` is a separate database, so the
    /// pool holds exactly one connection.
    pub fn memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder().max_size(1).build(manager)?;

        Self::new(pool)
    }

    /// Run `f` in a write transaction
    ///
    /// The transaction starts with `BEGIN IMMEDIATE`, so it holds the write
    /// lock before its first read. Commits if `f` returns `Ok`, rolls back
    /// otherwise.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SqlTxn<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.pool.get().map_err(StoreError::from)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let mut txn = SqlTxn { tx };

        match f(&mut txn) {
            Ok(value) => {
                txn.tx.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = txn.tx.rollback() {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Run `f` against a read-only snapshot
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&SqlTxn<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.pool.get().map_err(StoreError::from)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(StoreError::from)?;
        let txn = SqlTxn { tx };

        // dropping the transaction rolls it back
        f(&txn)
    }
}

/// One open SQLite transaction
pub struct SqlTxn<'c> {
    tx: Transaction<'c>,
}

impl<'c> SqlTxn<'c> {
    fn select_groups<P: Params>(&self, filter: &str, params: P) -> Result<Vec<Group>, StoreError> {
        let mut stmt = self
            .tx
            .prepare_cached(&format!("SELECT {} FROM group_nodes {}", GROUP_COLUMNS, filter))?;
        let groups = stmt
            .query_map(params, group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    fn select_memberships<P: Params>(
        &self,
        filter: &str,
        params: P,
    ) -> Result<Vec<Membership>, StoreError> {
        let mut stmt = self.tx.prepare_cached(&format!(
            "SELECT {} FROM memberships {}",
            MEMBERSHIP_COLUMNS, filter
        ))?;
        let memberships = stmt
            .query_map(params, membership_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(memberships)
    }

    fn select_events<P: Params>(&self, filter: &str, params: P) -> Result<Vec<Event>, StoreError> {
        let mut stmt = self
            .tx
            .prepare_cached(&format!("SELECT {} FROM events {}", EVENT_COLUMNS, filter))?;
        let events = stmt
            .query_map(params, event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Users with an accepted membership in `group_id`
    pub fn members_of(&self, group_id: &GroupId) -> Result<Vec<UserId>, StoreError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT user_id FROM memberships
             WHERE group_id = ?1 AND accepted_at IS NOT NULL
             ORDER BY user_id",
        )?;
        let users = stmt
            .query_map(params![group_id], |row| row.get(0))?
            .collect::<Result<Vec<UserId>, _>>()?;
        Ok(users)
    }

    /// Events about `subject`, oldest first
    pub fn events_for(&self, subject: &EventSubject) -> Result<Vec<Event>, StoreError> {
        self.select_events(
            "WHERE subject_kind = ?1 AND subject_id = ?2 ORDER BY rowid",
            params![subject.kind_str(), &subject.id_bytes()[..]],
        )
    }

    /// Events of one kind, oldest first
    pub fn events_of_kind(&self, kind: EventKind) -> Result<Vec<Event>, StoreError> {
        self.select_events("WHERE kind = ?1 ORDER BY rowid", params![kind.as_str()])
    }
}

impl<'c> GroupHierarchy for SqlTxn<'c> {
    fn find_group(&self, id: &GroupId) -> Result<Option<Group>, StoreError> {
        Ok(self.select_groups("WHERE id = ?1", params![id])?.into_iter().next())
    }

    fn children_of(&self, id: &GroupId) -> Result<Vec<Group>, StoreError> {
        self.select_groups("WHERE parent_id = ?1 ORDER BY created_at, id", params![id])
    }

    fn guest_group_for(&self, thread: &ThreadRef) -> Result<Option<Group>, StoreError> {
        Ok(self
            .select_groups(
                "WHERE thread_kind = ?1 AND thread_id = ?2",
                params![thread.kind, thread.id],
            )?
            .into_iter()
            .next())
    }
}

impl<'c> GroupStore for SqlTxn<'c> {
    fn insert_group(&mut self, group: &Group) -> Result<(), StoreError> {
        let (kind, thread) = match &group.kind {
            GroupKind::Formal => ("formal", None),
            GroupKind::Guest { thread } => ("guest", Some(thread)),
        };

        self.tx.execute(
            "INSERT INTO group_nodes (id, parent_id, name, kind, thread_kind, thread_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                group.id,
                group.parent_id,
                group.name,
                kind,
                thread.map(|t| t.kind),
                thread.map(|t| t.id),
                group.created_at,
            ],
        )?;
        Ok(())
    }

    fn delete_group(&mut self, id: &GroupId) -> Result<bool, StoreError> {
        let deleted = self
            .tx
            .execute("DELETE FROM group_nodes WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl<'c> MembershipStore for SqlTxn<'c> {
    fn find(&self, id: &MembershipId) -> Result<Option<Membership>, StoreError> {
        Ok(self
            .select_memberships("WHERE id = ?1", params![id])?
            .into_iter()
            .next())
    }

    fn find_by_group_and_user(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(self
            .select_memberships(
                "WHERE group_id = ?1 AND user_id = ?2",
                params![group_id, user_id],
            )?
            .into_iter()
            .next())
    }

    fn memberships_in_group(&self, group_id: &GroupId) -> Result<Vec<Membership>, StoreError> {
        self.select_memberships(
            "WHERE group_id = ?1 ORDER BY created_at, id",
            params![group_id],
        )
    }

    fn memberships_for_user(&self, user_id: &UserId) -> Result<Vec<Membership>, StoreError> {
        self.select_memberships(
            "WHERE user_id = ?1 ORDER BY created_at, id",
            params![user_id],
        )
    }

    fn create(&mut self, attrs: NewMembership) -> Result<Membership, StoreError> {
        let membership = attrs.into_membership();
        let experiences = serde_json::to_string(&membership.experiences)?;

        self.tx.execute(
            "INSERT INTO memberships
                (id, group_id, user_id, inviter_id, admin, accepted_at, experiences, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                membership.id,
                membership.group_id,
                membership.user_id,
                membership.inviter_id,
                membership.admin,
                membership.accepted_at,
                experiences,
                membership.created_at,
            ],
        )?;

        Ok(membership)
    }

    fn save(&mut self, membership: &Membership) -> Result<(), StoreError> {
        let experiences = serde_json::to_string(&membership.experiences)?;
        let updated = self.tx.execute(
            "UPDATE memberships
             SET inviter_id = ?2, admin = ?3, accepted_at = ?4, experiences = ?5
             WHERE id = ?1",
            params![
                membership.id,
                membership.inviter_id,
                membership.admin,
                membership.accepted_at,
                experiences,
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(format!("membership {}", membership.id)));
        }
        Ok(())
    }

    fn delete(&mut self, id: &MembershipId) -> Result<bool, StoreError> {
        let deleted = self
            .tx
            .execute("DELETE FROM memberships WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl<'c> EventEmitter for SqlTxn<'c> {
    fn emit(
        &mut self,
        kind: EventKind,
        actor: &UserId,
        subject: EventSubject,
    ) -> Result<Event, StoreError> {
        let event = Event::new(kind, actor.clone(), subject);

        self.tx.execute(
            "INSERT INTO events (id, kind, actor_id, subject_kind, subject_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id,
                event.kind.as_str(),
                event.actor_id,
                subject.kind_str(),
                &subject.id_bytes()[..],
                event.created_at,
            ],
        )?;

        tracing::debug!(event = %event.kind, actor = %event.actor_id, "Emitted event");
        Ok(event)
    }
}
