//! Core types for the local replica and the sync engine

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Epoch milliseconds
pub type Timestamp = i64;

/// Fixed primary key of the people counter row
pub const COUNTER_ID: i64 = 1;

/// Natural key the counter singleton is matched by
pub const COUNTER_NATURAL_KEY: &str = "people_counter";

/// Locally-owned identity of a record
///
/// `Unassigned` asks the store to allocate an id on insert. Serialized as
/// `null` / integer so JSON payloads stay flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<i64>", into = "Option<i64>")]
pub enum LocalId {
    #[default]
    Unassigned,
    Assigned(i64),
}

impl LocalId {
    pub fn get(self) -> Option<i64> {
        match self {
            LocalId::Assigned(id) => Some(id),
            LocalId::Unassigned => None,
        }
    }

    pub fn is_assigned(self) -> bool {
        matches!(self, LocalId::Assigned(_))
    }
}

impl From<Option<i64>> for LocalId {
    fn from(value: Option<i64>) -> Self {
        match value {
            Some(id) => LocalId::Assigned(id),
            None => LocalId::Unassigned,
        }
    }
}

impl From<LocalId> for Option<i64> {
    fn from(value: LocalId) -> Self {
        value.get()
    }
}

/// Entity collections kept in the local replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Guests,
    Volunteers,
    Jobs,
    JobTypeConfigs,
    Venues,
    Counter,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::JobTypeConfigs,
        Collection::Venues,
        Collection::Volunteers,
        Collection::Guests,
        Collection::Jobs,
        Collection::Counter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Guests => "guests",
            Collection::Volunteers => "volunteers",
            Collection::Jobs => "jobs",
            Collection::JobTypeConfigs => "job_type_configs",
            Collection::Venues => "venues",
            Collection::Counter => "people_counter",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "guests" | "guest" => Ok(Collection::Guests),
            "volunteers" | "volunteer" => Ok(Collection::Volunteers),
            "jobs" | "job" => Ok(Collection::Jobs),
            "job_type_configs" | "job_types" | "job_type" => Ok(Collection::JobTypeConfigs),
            "venues" | "venue" => Ok(Collection::Venues),
            "people_counter" | "counter" => Ok(Collection::Counter),
            _ => Err(format!("Unknown collection: {}", s)),
        }
    }
}

/// Declares a unit-only enum persisted as snake_case text
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Unknown {}: {}", stringify!($name), s)),
                }
            }
        }
    };
}

text_enum!(
    /// Volunteer rank earned through shifts or committee roles
    VolunteerRank {
        Nova => "nova",
        Etoile => "etoile",
        Galaxie => "galaxie",
        Orion => "orion",
        Veteran => "veteran",
        Special => "special",
    }
);

text_enum!(
    JobType {
        Bar => "bar",
        Security => "security",
        Cleaning => "cleaning",
        Setup => "setup",
        SoundTech => "sound_tech",
        Lighting => "lighting",
        Entrance => "entrance",
        Cloakroom => "cloakroom",
        Coordination => "coordination",
        Committee => "committee",
        CommissionPresidency => "commission_presidency",
        Meeting => "meeting",
        Other => "other",
    }
);

text_enum!(
    Gender {
        Female => "female",
        Male => "male",
        NonBinary => "non_binary",
        Other => "other",
        PreferNotToDisclose => "prefer_not_to_disclose",
    }
);

text_enum!(
    /// Which half of the night a shift falls in
    ShiftTime {
        BeforeMidnight => "before_midnight",
        AfterMidnight => "after_midnight",
    }
);

text_enum!(
    BenefitSystemType {
        Stellar => "stellar",
        Manual => "manual",
    }
);

impl Default for BenefitSystemType {
    fn default() -> Self {
        BenefitSystemType::Stellar
    }
}

/// Manual rewards attached to a job type using `BenefitSystemType::Manual`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualRewards {
    pub duration_days: i32,
    pub free_drinks: i32,
    pub bar_discount_percentage: i32,
    pub free_entry: bool,
    pub invites: i32,
    #[serde(default)]
    pub other_notes: String,
}

impl Default for ManualRewards {
    fn default() -> Self {
        Self {
            duration_days: 1,
            free_drinks: 0,
            bar_discount_percentage: 0,
            free_entry: false,
            invites: 0,
            other_notes: String::new(),
        }
    }
}

/// Identity and versioning shared by every synchronized record
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn local_id(&self) -> LocalId;
    fn set_local_id(&mut self, id: LocalId);
    fn remote_id(&self) -> Option<&str>;
    fn set_remote_id(&mut self, remote_id: Option<String>);
    fn last_modified(&self) -> Timestamp;
    fn set_last_modified(&mut self, timestamp: Timestamp);

    /// Key unique within the collection, used to bind records that have no remote id yet
    fn natural_key(&self) -> Option<&str> {
        None
    }
}

macro_rules! impl_entity {
    ($ty:ty, $collection:expr $(, natural_key = $field:ident)?) => {
        impl Entity for $ty {
            const COLLECTION: Collection = $collection;

            fn local_id(&self) -> LocalId {
                self.id
            }

            fn set_local_id(&mut self, id: LocalId) {
                self.id = id;
            }

            fn remote_id(&self) -> Option<&str> {
                self.remote_id.as_deref()
            }

            fn set_remote_id(&mut self, remote_id: Option<String>) {
                self.remote_id = remote_id;
            }

            fn last_modified(&self) -> Timestamp {
                self.last_modified
            }

            fn set_last_modified(&mut self, timestamp: Timestamp) {
                self.last_modified = timestamp;
            }

            $(
                fn natural_key(&self) -> Option<&str> {
                    Some(self.$field.as_str())
                }
            )?
        }
    };
}

/// A guest-list entry, optionally a volunteer's benefit invitation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    #[serde(default)]
    pub id: LocalId,
    #[serde(default)]
    pub remote_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub last_name_abbreviation: String,
    pub invitations: i32,
    pub venue_name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub is_volunteer_benefit: bool,
    /// Local id of the volunteer this benefit entry belongs to
    #[serde(default)]
    pub volunteer_id: Option<i64>,
    #[serde(default)]
    pub last_modified: Timestamp,
}

impl Guest {
    pub fn new(name: impl Into<String>, invitations: i32, venue_name: impl Into<String>) -> Self {
        Self {
            id: LocalId::Unassigned,
            remote_id: None,
            name: name.into(),
            last_name_abbreviation: String::new(),
            invitations,
            venue_name: venue_name.into(),
            notes: String::new(),
            is_volunteer_benefit: false,
            volunteer_id: None,
            last_modified: 0,
        }
    }
}

impl_entity!(Guest, Collection::Guests);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volunteer {
    #[serde(default)]
    pub id: LocalId,
    #[serde(default)]
    pub remote_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub last_name_abbreviation: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub current_rank: Option<VolunteerRank>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub last_shift_date: Option<Timestamp>,
    #[serde(default)]
    pub last_modified: Timestamp,
}

impl Volunteer {
    pub fn new(name: impl Into<String>, last_name_abbreviation: impl Into<String>) -> Self {
        Self {
            id: LocalId::Unassigned,
            remote_id: None,
            name: name.into(),
            last_name_abbreviation: last_name_abbreviation.into(),
            email: String::new(),
            phone_number: String::new(),
            date_of_birth: String::new(),
            gender: None,
            current_rank: None,
            is_active: true,
            last_shift_date: None,
            last_modified: 0,
        }
    }
}

impl_entity!(Volunteer, Collection::Volunteers);

/// A shift or role a volunteer worked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub id: LocalId,
    #[serde(default)]
    pub remote_id: Option<String>,
    pub volunteer_id: i64,
    pub job_type: JobType,
    pub job_type_name: String,
    pub venue_name: String,
    pub date: Timestamp,
    pub shift_time: ShiftTime,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub last_modified: Timestamp,
}

impl Job {
    pub fn new(
        volunteer_id: i64,
        job_type_name: impl Into<String>,
        venue_name: impl Into<String>,
        date: Timestamp,
        shift_time: ShiftTime,
    ) -> Self {
        let job_type_name = job_type_name.into();
        let job_type = job_type_name.parse().unwrap_or(JobType::Other);
        Self {
            id: LocalId::Unassigned,
            remote_id: None,
            volunteer_id,
            job_type,
            job_type_name,
            venue_name: venue_name.into(),
            date,
            shift_time,
            notes: String::new(),
            last_modified: 0,
        }
    }
}

impl_entity!(Job, Collection::Jobs);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTypeConfig {
    #[serde(default)]
    pub id: LocalId,
    #[serde(default)]
    pub remote_id: Option<String>,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Counts toward the nova / etoile / galaxie ranks
    #[serde(default = "default_true")]
    pub is_shift_job: bool,
    /// Counts toward the orion rank
    #[serde(default)]
    pub is_orion_job: bool,
    #[serde(default = "default_true")]
    pub requires_shift_time: bool,
    #[serde(default)]
    pub benefit_system_type: BenefitSystemType,
    #[serde(default)]
    pub manual_rewards: Option<ManualRewards>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub last_modified: Timestamp,
}

impl JobTypeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: LocalId::Unassigned,
            remote_id: None,
            name: name.into(),
            is_active: true,
            is_shift_job: true,
            is_orion_job: false,
            requires_shift_time: true,
            benefit_system_type: BenefitSystemType::Stellar,
            manual_rewards: None,
            description: String::new(),
            last_modified: 0,
        }
    }
}

impl_entity!(JobTypeConfig, Collection::JobTypeConfigs, natural_key = name);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    #[serde(default)]
    pub id: LocalId,
    #[serde(default)]
    pub remote_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub last_modified: Timestamp,
}

impl Venue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: LocalId::Unassigned,
            remote_id: None,
            name: name.into(),
            description: String::new(),
            is_active: true,
            last_modified: 0,
        }
    }
}

impl_entity!(Venue, Collection::Venues, natural_key = name);

/// The "people present" singleton
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    #[serde(default = "counter_id")]
    pub id: LocalId,
    #[serde(default)]
    pub remote_id: Option<String>,
    pub count: i64,
    #[serde(default)]
    pub last_modified: Timestamp,
}

impl Counter {
    pub fn new(count: i64) -> Self {
        Self {
            id: counter_id(),
            remote_id: None,
            count,
            last_modified: 0,
        }
    }
}

impl Entity for Counter {
    const COLLECTION: Collection = Collection::Counter;

    fn local_id(&self) -> LocalId {
        self.id
    }

    // The singleton always lives at COUNTER_ID, whatever a payload says
    fn set_local_id(&mut self, _id: LocalId) {
        self.id = counter_id();
    }

    fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    fn set_remote_id(&mut self, remote_id: Option<String>) {
        self.remote_id = remote_id;
    }

    fn last_modified(&self) -> Timestamp {
        self.last_modified
    }

    fn set_last_modified(&mut self, timestamp: Timestamp) {
        self.last_modified = timestamp;
    }

    fn natural_key(&self) -> Option<&str> {
        Some(COUNTER_NATURAL_KEY)
    }
}

fn counter_id() -> LocalId {
    LocalId::Assigned(COUNTER_ID)
}

fn default_true() -> bool {
    true
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database
    pub db_path: String,
    /// Journal mode of the replica file
    #[serde(default)]
    pub storage_mode: StorageMode,
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            storage_mode: StorageMode::Wal,
        }
    }
}

/// SQLite journal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    /// WAL journal, for a replica on local disk
    #[default]
    Wal,
    /// Single-file rollback journal, for a replica inside a synced folder
    Rollback,
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wal" | "local" => Ok(StorageMode::Wal),
            "rollback" | "cloud-safe" => Ok(StorageMode::Rollback),
            _ => Err(format!("Unknown storage mode: {}", s)),
        }
    }
}

/// Backoff applied when the remote reports rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    10_000
}

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between scheduled cycles of the background worker
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Run scheduled cycles at all
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    /// Skip pulled records whose remote id was deleted locally
    #[serde(default = "default_true")]
    pub honor_local_deletions: bool,
    /// How long deletion log entries are kept
    #[serde(default = "default_retention")]
    pub deletion_retention_days: u32,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            auto_sync: true,
            honor_local_deletions: true,
            deletion_retention_days: default_retention(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_interval() -> u64 {
    300
}

fn default_retention() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_id_serde() {
        let venue = Venue::new("MainHall");
        let json = serde_json::to_value(&venue).unwrap();
        assert_eq!(json["id"], serde_json::Value::Null);

        let mut assigned = venue.clone();
        assigned.id = LocalId::Assigned(7);
        let json = serde_json::to_value(&assigned).unwrap();
        assert_eq!(json["id"], 7);

        let back: Venue = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, LocalId::Assigned(7));
    }

    #[test]
    fn test_collection_parse() {
        assert_eq!("venues".parse::<Collection>(), Ok(Collection::Venues));
        assert_eq!("job-types".parse::<Collection>(), Ok(Collection::JobTypeConfigs));
        assert_eq!("counter".parse::<Collection>(), Ok(Collection::Counter));
        assert!("shifts".parse::<Collection>().is_err());
    }

    #[test]
    fn test_text_enum_round_trip() {
        assert_eq!(JobType::SoundTech.as_str(), "sound_tech");
        assert_eq!("SOUND_TECH".parse::<JobType>(), Ok(JobType::SoundTech));
        assert_eq!(
            serde_json::to_string(&ShiftTime::AfterMidnight).unwrap(),
            "\"after_midnight\""
        );
    }

    #[test]
    fn test_natural_keys() {
        assert_eq!(Venue::new("Groove").natural_key(), Some("Groove"));
        assert_eq!(JobTypeConfig::new("Bar").natural_key(), Some("Bar"));
        assert_eq!(Guest::new("Ana", 1, "Groove").natural_key(), None);
        assert_eq!(Counter::new(0).natural_key(), Some(COUNTER_NATURAL_KEY));
    }

    #[test]
    fn test_counter_id_is_fixed() {
        let mut counter = Counter::new(3);
        counter.set_local_id(LocalId::Assigned(42));
        assert_eq!(counter.local_id(), LocalId::Assigned(COUNTER_ID));

        let parsed: Counter = serde_json::from_str(r#"{"count": 5}"#).unwrap();
        assert_eq!(parsed.id, LocalId::Assigned(COUNTER_ID));
    }

    #[test]
    fn test_job_type_from_name() {
        let job = Job::new(1, "bar", "Groove", 0, ShiftTime::BeforeMidnight);
        assert_eq!(job.job_type, JobType::Bar);
        let custom = Job::new(1, "Poster run", "Groove", 0, ShiftTime::BeforeMidnight);
        assert_eq!(custom.job_type, JobType::Other);
    }

    #[test]
    fn test_sync_config_defaults() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.interval_secs, 300);
        assert!(config.honor_local_deletions);
        assert_eq!(config.retry.max_attempts, 3);
    }
}
