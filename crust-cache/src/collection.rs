//! Live to-many relation contents.

use std::fmt;
use std::sync::Arc;

use crust_types::RecordId;
use tokio::sync::watch;

use crate::database::DbHandle;
use crate::entity::Entity;
use crate::observe::Observable;

/// One element of a [`Collection`].
#[derive(Debug, Clone)]
pub enum Member {
    /// Identity of a record cached in the target table.
    Key(RecordId),
    /// A related record that has no server identity yet.
    Detached(Entity),
}

impl Member {
    pub fn key(&self) -> Option<RecordId> {
        match self {
            Member::Key(id) => Some(*id),
            Member::Detached(entity) => entity.id(),
        }
    }
}

impl From<RecordId> for Member {
    fn from(id: RecordId) -> Self {
        Member::Key(id)
    }
}

impl From<Entity> for Member {
    fn from(entity: Entity) -> Self {
        match entity.id() {
            Some(id) if entity.table().is_some() => Member::Key(id),
            _ => Member::Detached(entity),
        }
    }
}

struct CollectionInner {
    model: String,
    db: DbHandle,
    members: Observable<Vec<Member>>,
}

/// Ordered, observable list of related records.
///
/// The collection owned by an entity property keeps its identity for the
/// entity's lifetime; assigning the property replaces the contents.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl Collection {
    pub(crate) fn new(model: String, db: DbHandle) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                model,
                db,
                members: Observable::new(Vec::new()),
            }),
        }
    }

    /// Name of the model the members belong to.
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    pub fn len(&self) -> usize {
        self.inner.members.with(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn members(&self) -> Vec<Member> {
        self.inner.members.get()
    }

    /// Identities of the members that have one, in order.
    pub fn keys(&self) -> Vec<RecordId> {
        self.members().iter().filter_map(Member::key).collect()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.keys().contains(id)
    }

    /// Resolves the member at `index` through the target table.
    pub fn get(&self, index: usize) -> Option<Entity> {
        let member = self.inner.members.with(|m| m.get(index).cloned())?;
        self.resolve(member)
    }

    /// Resolves every member; keys the target table rejects are skipped.
    pub fn to_vec(&self) -> Vec<Entity> {
        self.members()
            .into_iter()
            .filter_map(|member| self.resolve(member))
            .collect()
    }

    pub fn replace_all(&self, members: impl IntoIterator<Item = Member>) {
        let members: Vec<Member> = members.into_iter().collect();
        self.inner.members.update(|current| *current = members);
    }

    pub fn push(&self, member: impl Into<Member>) {
        let member = member.into();
        self.inner.members.update(|current| current.push(member));
    }

    /// Removes every member with this identity.
    pub fn remove(&self, id: &RecordId) -> bool {
        self.inner.members.modify(|current| {
            let before = current.len();
            current.retain(|member| member.key().as_ref() != Some(id));
            current.len() != before
        })
    }

    pub fn clear(&self) {
        self.inner.members.modify(|current| {
            let changed = !current.is_empty();
            current.clear();
            changed
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Member>> {
        self.inner.members.subscribe()
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn resolve(&self, member: Member) -> Option<Entity> {
        match member {
            Member::Detached(entity) => Some(entity),
            Member::Key(id) => self
                .inner
                .db
                .upgrade()?
                .table_by_name(&self.inner.model)?
                .get(id),
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("model", &self.inner.model)
            .field("len", &self.len())
            .finish()
    }
}
