//! Spec diffing and action selection.
//!
//! Fields are split into two tiers. A change to any [`FieldClass::Immutable`]
//! field replaces the resource (delete the old image, then create the new
//! one). Changes confined to [`FieldClass::Mutable`] fields are applied in
//! place and never reach the engine.

use std::fmt;

use berth_image::ImageSpec;
use serde::Serialize;

/// Whether a field tolerates in-place change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldClass {
    /// Any change forces replacement.
    Immutable,
    /// Changes are local bookkeeping.
    Mutable,
}

/// A top-level field of [`ImageSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// `name`
    Name,
    /// `build`
    Build,
    /// `pull_triggers`
    PullTriggers,
    /// `triggers`
    Triggers,
    /// `platform`
    Platform,
    /// `keep_locally`
    KeepLocally,
    /// `force_remove`
    ForceRemove,
    /// `timeouts`
    Timeouts,
}

impl Field {
    /// Every field, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Name,
        Self::Build,
        Self::PullTriggers,
        Self::Triggers,
        Self::Platform,
        Self::KeepLocally,
        Self::ForceRemove,
        Self::Timeouts,
    ];

    /// The field's tier.
    #[must_use]
    pub const fn class(self) -> FieldClass {
        match self {
            Self::KeepLocally | Self::ForceRemove | Self::Timeouts => FieldClass::Mutable,
            Self::Name | Self::Build | Self::PullTriggers | Self::Triggers | Self::Platform => {
                FieldClass::Immutable
            }
        }
    }

    /// Wire name of the field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Build => "build",
            Self::PullTriggers => "pull_triggers",
            Self::Triggers => "triggers",
            Self::Platform => "platform",
            Self::KeepLocally => "keep_locally",
            Self::ForceRemove => "force_remove",
            Self::Timeouts => "timeouts",
        }
    }

    fn differs(self, old: &ImageSpec, new: &ImageSpec) -> bool {
        match self {
            Self::Name => old.name != new.name,
            Self::Build => old.build != new.build,
            Self::PullTriggers => old.pull_triggers_fingerprint() != new.pull_triggers_fingerprint(),
            Self::Triggers => old.triggers_fingerprint() != new.triggers_fingerprint(),
            Self::Platform => old.platform != new.platform,
            Self::KeepLocally => old.keep_locally != new.keep_locally,
            Self::ForceRemove => old.force_remove != new.force_remove,
            Self::Timeouts => old.timeouts != new.timeouts,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields that differ between two specs, in declaration order.
#[must_use]
pub fn diff(old: &ImageSpec, new: &ImageSpec) -> Vec<Field> {
    Field::ALL
        .into_iter()
        .filter(|field| field.differs(old, new))
        .collect()
}

/// What to do for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Plan {
    /// Nothing recorded, acquire the image.
    Create,
    /// Recorded and desired agree.
    NoOp,
    /// Only mutable fields changed.
    UpdateInPlace {
        /// The changed mutable fields.
        changed: Vec<Field>,
    },
    /// An immutable field changed.
    Replace {
        /// The changed immutable fields.
        reasons: Vec<Field>,
    },
    /// Recorded but no longer desired.
    Delete,
}

impl Plan {
    /// Whether executing this plan calls the engine.
    #[must_use]
    pub const fn touches_engine(&self) -> bool {
        matches!(self, Self::Create | Self::Replace { .. } | Self::Delete)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(fields: &[Field]) -> String {
            fields
                .iter()
                .map(|field| field.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        }

        match self {
            Self::Create => f.write_str("create"),
            Self::NoOp => f.write_str("no changes"),
            Self::UpdateInPlace { changed } => write!(f, "update in place ({})", join(changed)),
            Self::Replace { reasons } => write!(f, "replace ({})", join(reasons)),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Choose the action that moves `prior` to `desired`.
///
/// `prior` is the `ImageSpec` last applied, `None` if nothing is recorded. `desired`
/// is `None` when the resource was removed from configuration.
#[must_use]
pub fn plan(prior: Option<&ImageSpec>, desired: Option<&ImageSpec>) -> Plan {
    match (prior, desired) {
        (None, None) => Plan::NoOp,
        (None, Some(_)) => Plan::Create,
        (Some(_), None) => Plan::Delete,
        (Some(old), Some(new)) => {
            let (reasons, changed): (Vec<Field>, Vec<Field>) = diff(old, new)
                .into_iter()
                .partition(|field| field.class() == FieldClass::Immutable);

            if !reasons.is_empty() {
                Plan::Replace { reasons }
            } else if !changed.is_empty() {
                Plan::UpdateInPlace { changed }
            } else {
                Plan::NoOp
            }
        }
    }
}
