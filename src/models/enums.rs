use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Role {
    Patient => "patient",
    Doctor => "doctor",
});

str_enum!(ConnectionStatus {
    Pending => "pending",
    Connected => "connected",
});

// Flags a patient can grant a connected doctor. `pinned` is a display
// preference, not a capability.
str_enum!(Capability {
    ChatEnabled => "chat_enabled",
    ViewPastNotes => "view_past_notes",
    ReportsAccess => "reports_access",
    UpdateRecords => "update_records",
    ViewHealthLogs => "view_health_logs",
});

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::ChatEnabled,
        Capability::ViewPastNotes,
        Capability::ReportsAccess,
        Capability::UpdateRecords,
        Capability::ViewHealthLogs,
    ];
}
