use std::fmt;

/// Logical collections of the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Usernames,
    TaskGroups,
    Tasks,
    SocialGroups,
    Members,
    Invites,
    UsernameClaims,
    Memberships,
    XpAwards,
    PendingAwards,
}

impl Collection {
    /// Key prefix used by the single-table DynamoDB layout.
    pub fn tag(&self) -> &'static str {
        match self {
            Collection::Users => "USER",
            Collection::Usernames => "USERNAME",
            Collection::TaskGroups => "TASK_GROUP",
            Collection::Tasks => "TASK",
            Collection::SocialGroups => "SOCIAL_GROUP",
            Collection::Members => "MEMBER",
            Collection::Invites => "INVITE",
            Collection::UsernameClaims => "USERNAME_CLAIM",
            Collection::Memberships => "MEMBERSHIP",
            Collection::XpAwards => "XP_AWARD",
            Collection::PendingAwards => "PENDING_AWARD",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Usernames => "usernames",
            Collection::TaskGroups => "groups",
            Collection::Tasks => "tasks",
            Collection::SocialGroups => "socialGroups",
            Collection::Members => "members",
            Collection::Invites => "invites",
            Collection::UsernameClaims => "usernameClaims",
            Collection::Memberships => "memberships",
            Collection::XpAwards => "xpAwards",
            Collection::PendingAwards => "pendingAwards",
        }
    }
}

/// A top-level collection, or a sub-collection under one parent document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    pub parent: Option<(Collection, String)>,
    pub collection: Collection,
}

impl CollectionPath {
    pub fn root(collection: Collection) -> Self {
        Self { parent: None, collection }
    }

    pub fn nested(parent: Collection, parent_id: &str, collection: Collection) -> Self {
        Self {
            parent: Some((parent, parent_id.to_string())),
            collection,
        }
    }

    pub fn doc(&self, id: &str) -> DocKey {
        DocKey {
            path: self.clone(),
            id: id.to_string(),
        }
    }

    /// Shared partition of a nested collection, PK = "USER#{id}" for the
    /// children of a user. Top-level documents each own their partition.
    pub fn partition_key(&self) -> Option<String> {
        self.parent
            .as_ref()
            .map(|(parent, parent_id)| format!("{}#{}", parent.tag(), parent_id))
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn sort_prefix(&self) -> String {
        format!("{}#", self.collection.tag())
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            None => write!(f, "{}", self.collection.name()),
            Some((parent, parent_id)) => {
                write!(f, "{}/{}/{}", parent.name(), parent_id, self.collection.name())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocKey {
    pub path: CollectionPath,
    pub id: String,
}

impl DocKey {
    pub fn collection(&self) -> Collection {
        self.path.collection
    }

    /// Top-level: PK = "USER#{id}", SK = "USER".
    /// Nested:    PK = "USER#{parent}", SK = "TASK#{id}".
    pub fn partition_key(&self) -> String {
        self.path
            .partition_key()
            .unwrap_or_else(|| format!("{}{}", self.path.sort_prefix(), self.id))
    }

    pub fn sort_key(&self) -> String {
        if self.path.is_root() {
            self.collection().tag().to_string()
        } else {
            format!("{}{}", self.path.sort_prefix(), self.id)
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.path, self.id)
    }
}

// ========== USERS ==========
pub fn users() -> CollectionPath {
    CollectionPath::root(Collection::Users)
}

pub fn user(user_id: &str) -> DocKey {
    users().doc(user_id)
}

pub fn usernames() -> CollectionPath {
    CollectionPath::root(Collection::Usernames)
}

pub fn username(lowercase: &str) -> DocKey {
    usernames().doc(lowercase)
}

pub fn username_claims(user_id: &str) -> CollectionPath {
    CollectionPath::nested(Collection::Users, user_id, Collection::UsernameClaims)
}

pub fn username_claim(user_id: &str, lowercase: &str) -> DocKey {
    username_claims(user_id).doc(lowercase)
}

pub fn xp_awards(user_id: &str) -> CollectionPath {
    CollectionPath::nested(Collection::Users, user_id, Collection::XpAwards)
}

pub fn xp_award(user_id: &str, award_key: &str) -> DocKey {
    xp_awards(user_id).doc(award_key)
}

pub fn pending_awards(user_id: &str) -> CollectionPath {
    CollectionPath::nested(Collection::Users, user_id, Collection::PendingAwards)
}

pub fn pending_award(user_id: &str, task_id: &str) -> DocKey {
    pending_awards(user_id).doc(task_id)
}

// ========== TASKS ==========
pub fn task_groups(user_id: &str) -> CollectionPath {
    CollectionPath::nested(Collection::Users, user_id, Collection::TaskGroups)
}

pub fn task_group(user_id: &str, group_id: &str) -> DocKey {
    task_groups(user_id).doc(group_id)
}

pub fn tasks(user_id: &str) -> CollectionPath {
    CollectionPath::nested(Collection::Users, user_id, Collection::Tasks)
}

pub fn task(user_id: &str, task_id: &str) -> DocKey {
    tasks(user_id).doc(task_id)
}

// ========== SOCIAL ==========
pub fn social_groups() -> CollectionPath {
    CollectionPath::root(Collection::SocialGroups)
}

pub fn social_group(group_id: &str) -> DocKey {
    social_groups().doc(group_id)
}

pub fn members(group_id: &str) -> CollectionPath {
    CollectionPath::nested(Collection::SocialGroups, group_id, Collection::Members)
}

pub fn member(group_id: &str, user_id: &str) -> DocKey {
    members(group_id).doc(user_id)
}

pub fn memberships(user_id: &str) -> CollectionPath {
    CollectionPath::nested(Collection::Users, user_id, Collection::Memberships)
}

pub fn membership(user_id: &str, group_id: &str) -> DocKey {
    memberships(user_id).doc(group_id)
}

pub fn invites(user_id: &str) -> CollectionPath {
    CollectionPath::nested(Collection::Users, user_id, Collection::Invites)
}

pub fn invite(user_id: &str, invite_id: &str) -> DocKey {
    invites(user_id).doc(invite_id)
}
