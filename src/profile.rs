use std::fmt;
use std::str::FromStr;

use noseprint_vision::Embedding;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DogType {
    #[default]
    Pet,
    Street,
    Adopted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DogGender {
    Male,
    Female,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DogColor {
    #[default]
    None,
    Black,
    White,
    Brown,
    Mixed,
    Golden,
}

macro_rules! named_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> anyhow::Result<Self> {
                $(if s.eq_ignore_ascii_case($name) || s.eq_ignore_ascii_case(stringify!($variant)) {
                    return Ok($ty::$variant);
                })+
                anyhow::bail!("unknown {} {:?}", stringify!($ty), s)
            }
        }
    };
}

named_enum!(DogType { Pet => "Pet", Street => "Street Dog", Adopted => "Adopted" });
named_enum!(DogGender { Male => "Male", Female => "Female", None => "None" });
named_enum!(DogColor {
    None => "None",
    Black => "Black",
    White => "White",
    Brown => "Brown",
    Mixed => "Mixed",
    Golden => "Golden",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccinationRecord {
    pub date: String,
    pub id: Uuid,
}

impl VaccinationRecord {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            id: Uuid::new_v4(),
        }
    }
}

/// Descriptive attributes entered by the operator. Never used for matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DogDetails {
    pub name: String,
    pub breed: String,
    pub gender: DogGender,
    pub primary_color: DogColor,
    pub secondary_color: DogColor,
    pub age_in_months: u32,
    pub dog_type: DogType,
    pub owner_name: Option<String>,
    pub adoption_date: Option<String>,
    pub vaccinations: Vec<VaccinationRecord>,
    pub microchip_number: Option<String>,
}

/// A registered dog.
///
/// `id` is assigned by the store on insert; whatever the caller puts there
/// is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DogProfile {
    pub id: i64,
    pub details: DogDetails,
    /// First copied nose photo.
    pub image_uri: Option<String>,
    /// Folder holding the full image set.
    pub storage_uri: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    #[serde(with = "codec::embedding_le")]
    pub embedding: Embedding,
}

impl DogProfile {
    pub fn new(details: DogDetails, embedding: Embedding) -> Self {
        Self {
            id: 0,
            details,
            image_uri: None,
            storage_uri: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            embedding,
        }
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    /// Whether this profile can take part in matching.
    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}
