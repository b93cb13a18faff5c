//! Project listing schema

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for projects
pub const PROJECT_COLLECTION: &str = "projects";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Draft,
    Published,
    Funded,
    Closed,
}

/// Project document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Project {
    pub id: String,

    /// Owner profile id
    pub entrepreneur_id: String,

    pub title: String,

    pub description: String,

    pub sector: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    pub funding_goal: f64,

    #[serde(default)]
    pub amount_raised: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_deck_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    #[serde(default)]
    pub status: ProjectStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// New draft listing
    pub fn new(
        entrepreneur_id: String,
        title: String,
        description: String,
        sector: String,
        funding_goal: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: crate::db::new_id(),
            entrepreneur_id,
            title,
            description,
            sector,
            location: None,
            funding_goal,
            amount_raised: 0.0,
            pitch_deck_url: None,
            image_url: None,
            video_url: None,
            status: ProjectStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: &ProjectPatch) {
        if let Some(v) = &patch.title {
            self.title = v.clone();
        }
        if let Some(v) = &patch.description {
            self.description = v.clone();
        }
        if let Some(v) = &patch.sector {
            self.sector = v.clone();
        }
        if let Some(v) = &patch.location {
            self.location = Some(v.clone());
        }
        if let Some(v) = patch.funding_goal {
            self.funding_goal = v;
        }
        if let Some(v) = &patch.pitch_deck_url {
            self.pitch_deck_url = Some(v.clone());
        }
        if let Some(v) = &patch.image_url {
            self.image_url = Some(v.clone());
        }
        if let Some(v) = &patch.video_url {
            self.video_url = Some(v.clone());
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update of a project
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub sector: Option<String>,
    pub location: Option<String>,
    pub funding_goal: Option<f64>,
    #[serde(skip)]
    pub pitch_deck_url: Option<String>,
    #[serde(skip)]
    pub image_url: Option<String>,
    #[serde(skip)]
    pub video_url: Option<String>,
    pub status: Option<ProjectStatus>,
}

impl ProjectPatch {
    pub fn to_set_document(&self) -> Result<Document, bson::ser::Error> {
        let mut set = Document::new();
        if let Some(v) = &self.title {
            set.insert("title", v);
        }
        if let Some(v) = &self.description {
            set.insert("description", v);
        }
        if let Some(v) = &self.sector {
            set.insert("sector", v);
        }
        if let Some(v) = &self.location {
            set.insert("location", v);
        }
        if let Some(v) = self.funding_goal {
            set.insert("funding_goal", v);
        }
        if let Some(v) = &self.pitch_deck_url {
            set.insert("pitch_deck_url", v);
        }
        if let Some(v) = &self.image_url {
            set.insert("image_url", v);
        }
        if let Some(v) = &self.video_url {
            set.insert("video_url", v);
        }
        if let Some(v) = self.status {
            set.insert("status", bson::to_bson(&v)?);
        }
        set.insert("updated_at", bson::to_bson(&Utc::now())?);
        Ok(set)
    }
}

/// Listing filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub sector: Option<String>,
    pub entrepreneur_id: Option<String>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        self.status.map_or(true, |s| project.status == s)
            && self.sector.as_ref().map_or(true, |s| &project.sector == s)
            && self
                .entrepreneur_id
                .as_ref()
                .map_or(true, |e| &project.entrepreneur_id == e)
    }

    pub fn to_document(&self) -> Result<Document, bson::ser::Error> {
        let mut filter = Document::new();
        if let Some(s) = self.status {
            filter.insert("status", bson::to_bson(&s)?);
        }
        if let Some(s) = &self.sector {
            filter.insert("sector", s);
        }
        if let Some(e) = &self.entrepreneur_id {
            filter.insert("entrepreneur_id", e);
        }
        Ok(filter)
    }
}

impl IntoIndexes for Project {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("project_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "entrepreneur_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("entrepreneur_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "status": 1, "sector": 1 },
                Some(
                    IndexOptions::builder()
                        .name("status_sector_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
