use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a topic routes messages to its subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    /// Exact route key match.
    Direct,
    /// Dotted words with `*` and `#` wildcards.
    #[default]
    Topic,
    /// Every subscription receives every message.
    Fanout,
    /// Glob patterns, as used by Redis pattern subscriptions.
    Pattern,
}

/// Queue and subscription processing options. Unset values fall back to the
/// broker client's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntityOptions {
    pub durable: Option<bool>,
    pub exclusive: Option<bool>,
    pub auto_delete: Option<bool>,
    #[serde(with = "duration_ms")]
    pub lock_duration: Option<Duration>,
    pub max_delivery_count: Option<u32>,
    pub dead_letter_on_expiration: Option<bool>,
    #[serde(with = "duration_ms")]
    pub auto_delete_on_idle: Option<Duration>,
    #[serde(with = "duration_ms")]
    pub message_ttl: Option<Duration>,
    pub enable_batched_operations: Option<bool>,
    pub prefetch_count: Option<u16>,
    pub max_concurrent_calls: Option<u32>,
    /// Client-specific arguments passed through untouched.
    pub arguments: BTreeMap<String, String>,
}

impl EntityOptions {
    /// Overlay declared values on top of `defaults`.
    pub fn merged_over(&self, defaults: &EntityOptions) -> EntityOptions {
        let mut arguments = defaults.arguments.clone();
        arguments.extend(self.arguments.clone());
        EntityOptions {
            durable: self.durable.or(defaults.durable),
            exclusive: self.exclusive.or(defaults.exclusive),
            auto_delete: self.auto_delete.or(defaults.auto_delete),
            lock_duration: self.lock_duration.or(defaults.lock_duration),
            max_delivery_count: self.max_delivery_count.or(defaults.max_delivery_count),
            dead_letter_on_expiration: self.dead_letter_on_expiration.or(defaults.dead_letter_on_expiration),
            auto_delete_on_idle: self.auto_delete_on_idle.or(defaults.auto_delete_on_idle),
            message_ttl: self.message_ttl.or(defaults.message_ttl),
            enable_batched_operations: self.enable_batched_operations.or(defaults.enable_batched_operations),
            prefetch_count: self.prefetch_count.or(defaults.prefetch_count),
            max_concurrent_calls: self.max_concurrent_calls.or(defaults.max_concurrent_calls),
            arguments,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Where a broker entity lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityAddress {
    Queue(String),
    Topic(String),
    Subscription { topic: String, name: String },
}

impl EntityAddress {
    pub fn queue(name: impl Into<String>) -> Self {
        EntityAddress::Queue(name.into())
    }

    pub fn topic(name: impl Into<String>) -> Self {
        EntityAddress::Topic(name.into())
    }

    pub fn subscription(topic: impl Into<String>, name: impl Into<String>) -> Self {
        EntityAddress::Subscription {
            topic: topic.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EntityAddress::Queue(name) | EntityAddress::Topic(name) => name,
            EntityAddress::Subscription { name, .. } => name,
        }
    }
}

impl fmt::Display for EntityAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityAddress::Queue(name) => write!(f, "queue:{}", name),
            EntityAddress::Topic(name) => write!(f, "topic:{}", name),
            EntityAddress::Subscription { topic, name } => write!(f, "subscription:{}/{}", topic, name),
        }
    }
}

/// What to create on the broker for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityDeclaration {
    Queue {
        name: String,
        options: EntityOptions,
    },
    Topic {
        name: String,
        kind: TopicKind,
        /// Created by a subscriber before the owning service started.
        placeholder: bool,
    },
    Subscription {
        topic: String,
        name: String,
        filters: Vec<String>,
        options: EntityOptions,
    },
}

impl EntityDeclaration {
    pub fn queue(name: impl Into<String>) -> Self {
        EntityDeclaration::Queue {
            name: name.into(),
            options: EntityOptions::default(),
        }
    }

    pub fn topic(name: impl Into<String>, kind: TopicKind) -> Self {
        EntityDeclaration::Topic {
            name: name.into(),
            kind,
            placeholder: false,
        }
    }

    /// A topic declared on behalf of its future owner.
    pub fn placeholder_topic(name: impl Into<String>, kind: TopicKind) -> Self {
        EntityDeclaration::Topic {
            name: name.into(),
            kind,
            placeholder: true,
        }
    }

    pub fn subscription(topic: impl Into<String>, name: impl Into<String>, filters: Vec<String>) -> Self {
        EntityDeclaration::Subscription {
            topic: topic.into(),
            name: name.into(),
            filters,
            options: EntityOptions::default(),
        }
    }

    /// Replace the options of a queue or subscription.
    pub fn with_options(mut self, value: EntityOptions) -> Self {
        match &mut self {
            EntityDeclaration::Queue { options, .. } | EntityDeclaration::Subscription { options, .. } => {
                *options = value;
            }
            EntityDeclaration::Topic { .. } => {}
        }
        self
    }

    pub fn address(&self) -> EntityAddress {
        match self {
            EntityDeclaration::Queue { name, .. } => EntityAddress::Queue(name.clone()),
            EntityDeclaration::Topic { name, .. } => EntityAddress::Topic(name.clone()),
            EntityDeclaration::Subscription { topic, name, .. } => EntityAddress::Subscription {
                topic: topic.clone(),
                name: name.clone(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EntityDeclaration::Queue { name, .. }
            | EntityDeclaration::Topic { name, .. }
            | EntityDeclaration::Subscription { name, .. } => name,
        }
    }

    pub fn options(&self) -> Option<&EntityOptions> {
        match self {
            EntityDeclaration::Queue { options, .. } | EntityDeclaration::Subscription { options, .. } => {
                Some(options)
            }
            EntityDeclaration::Topic { .. } => None,
        }
    }
}
