//! Project listings

use bytes::Bytes;
use serde::Deserialize;
use tracing::info;

use crate::auth::{Role, Session};
use crate::db::{
    Project, ProjectFilter, ProjectPatch, ProjectStatus, PROJECT_COLLECTION,
};
use crate::feed::ChangeOp;
use crate::gate::AccessGate;
use crate::services::{optional_text, require_profile, required_text, ServiceContext};
use crate::storage::{upload_file, Bucket};
use crate::types::{ConnectError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub sector: String,
    #[serde(default)]
    pub location: Option<String>,
    pub funding_goal: f64,
    /// Publish immediately instead of saving a draft
    #[serde(default)]
    pub publish: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectQuery {
    pub sector: Option<String>,
    /// List the caller's own projects in every status
    #[serde(default)]
    pub mine: bool,
}

/// Media slot on a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    PitchDeck,
    Image,
    Video,
}

impl MediaKind {
    pub fn bucket(&self) -> Bucket {
        match self {
            MediaKind::PitchDeck => Bucket::PitchDecks,
            MediaKind::Image => Bucket::ProjectImages,
            MediaKind::Video => Bucket::ProjectVideos,
        }
    }
}

fn owner_gate() -> AccessGate {
    AccessGate::new().roles(&[Role::Entrepreneur]).kyc()
}

fn validate_goal(goal: f64) -> Result<()> {
    if !goal.is_finite() || goal <= 0.0 {
        return Err(ConnectError::validation(
            "funding_goal",
            "L'objectif de financement doit être supérieur à zéro",
        ));
    }
    Ok(())
}

fn publish(ctx: &ServiceContext, op: ChangeOp, project: &Project) {
    // Published listings are visible to everyone; drafts only to the owner
    let audience = match project.status {
        ProjectStatus::Draft => vec![project.entrepreneur_id.clone()],
        _ => Vec::new(),
    };
    ctx.feed.publish(PROJECT_COLLECTION, op, project, audience);
}

pub async fn list(ctx: &ServiceContext, session: &Session, query: ProjectQuery) -> Result<Vec<Project>> {
    let profile = require_profile(session)?;
    let filter = if query.mine {
        ProjectFilter {
            status: None,
            sector: query.sector,
            entrepreneur_id: Some(profile.id.clone()),
        }
    } else {
        ProjectFilter {
            status: Some(ProjectStatus::Published),
            sector: query.sector,
            entrepreneur_id: None,
        }
    };
    ctx.store.list_projects(&filter).await
}

/// Drafts are only visible to their owner and admins
pub async fn get(ctx: &ServiceContext, session: &Session, id: &str) -> Result<Project> {
    let profile = require_profile(session)?;
    ctx.store
        .get_project(id)
        .await?
        .filter(|p| {
            p.status != ProjectStatus::Draft || p.entrepreneur_id == profile.id || session.is_admin()
        })
        .ok_or_else(|| ConnectError::NotFound(format!("project {}", id)))
}

async fn get_owned(ctx: &ServiceContext, session: &Session, id: &str) -> Result<Project> {
    owner_gate().check(session)?;
    let profile = require_profile(session)?;
    ctx.store
        .get_project(id)
        .await?
        .filter(|p| p.entrepreneur_id == profile.id)
        .ok_or_else(|| ConnectError::NotFound(format!("project {}", id)))
}

pub async fn create(ctx: &ServiceContext, session: &Session, input: NewProject) -> Result<Project> {
    owner_gate().check(session)?;
    let profile = require_profile(session)?;

    validate_goal(input.funding_goal)?;
    let mut project = Project::new(
        profile.id.clone(),
        required_text("title", &input.title, 200)?,
        required_text("description", &input.description, 10_000)?,
        required_text("sector", &input.sector, 80)?,
        input.funding_goal,
    );
    project.location = optional_text("location", input.location, 120)?;
    if input.publish {
        project.status = ProjectStatus::Published;
    }

    let project = ctx.store.insert_project(project).await?;
    info!(project_id = %project.id, entrepreneur_id = %profile.id, "Project created");
    publish(ctx, ChangeOp::Insert, &project);
    Ok(project)
}

pub async fn update(
    ctx: &ServiceContext,
    session: &Session,
    id: &str,
    mut patch: ProjectPatch,
) -> Result<Project> {
    let project = get_owned(ctx, session, id).await?;

    if let Some(goal) = patch.funding_goal {
        validate_goal(goal)?;
    }
    if let Some(title) = &patch.title {
        patch.title = Some(required_text("title", title, 200)?);
    }
    if let Some(description) = &patch.description {
        patch.description = Some(required_text("description", description, 10_000)?);
    }
    if let Some(sector) = &patch.sector {
        patch.sector = Some(required_text("sector", sector, 80)?);
    }

    let updated = ctx
        .store
        .update_project(&project.id, patch)
        .await?
        .ok_or_else(|| ConnectError::NotFound(format!("project {}", id)))?;
    publish(ctx, ChangeOp::Update, &updated);
    Ok(updated)
}

pub async fn upload_media(
    ctx: &ServiceContext,
    session: &Session,
    id: &str,
    kind: MediaKind,
    file_name: &str,
    content: Bytes,
) -> Result<Project> {
    let project = get_owned(ctx, session, id).await?;
    let url = upload_file(
        ctx.storage.as_ref(),
        kind.bucket(),
        &project.entrepreneur_id,
        file_name,
        content,
    )
    .await?;

    let mut patch = ProjectPatch::default();
    match kind {
        MediaKind::PitchDeck => patch.pitch_deck_url = Some(url),
        MediaKind::Image => patch.image_url = Some(url),
        MediaKind::Video => patch.video_url = Some(url),
    }

    let updated = ctx
        .store
        .update_project(&project.id, patch)
        .await?
        .ok_or_else(|| ConnectError::NotFound(format!("project {}", id)))?;
    publish(ctx, ChangeOp::Update, &updated);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kyc::KycStatus;
    use crate::services::testing::{context, user};
    use hyper::StatusCode;

    fn new_project(publish: bool) -> NewProject {
        NewProject {
            title: "Moulin à karité".into(),
            description: "Transformation locale".into(),
            sector: "agro".into(),
            location: Some("Bobo-Dioulasso".into()),
            funding_goal: 12_000_000.0,
            publish,
        }
    }

    #[tokio::test]
    async fn test_create_requires_approved_entrepreneur() {
        let (ctx, _) = context();
        let pending = user(&ctx, "ent", Role::Entrepreneur, KycStatus::Pending).await;
        let inv = user(&ctx, "inv", Role::Investor, KycStatus::Approved).await;

        let err = create(&ctx, &pending, new_project(true)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(create(&ctx, &inv, new_project(true)).await.is_err());
    }

    #[tokio::test]
    async fn test_drafts_hidden_from_others() {
        let (ctx, _) = context();
        let ent = user(&ctx, "ent", Role::Entrepreneur, KycStatus::Approved).await;
        let inv = user(&ctx, "inv", Role::Investor, KycStatus::Approved).await;

        let draft = create(&ctx, &ent, new_project(false)).await.unwrap();
        let live = create(&ctx, &ent, new_project(true)).await.unwrap();

        let listed = list(&ctx, &inv, ProjectQuery::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, live.id);
        assert!(get(&ctx, &inv, &draft.id).await.is_err());

        let mine = list(
            &ctx,
            &ent,
            ProjectQuery {
                sector: None,
                mine: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(mine.len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_media_owner_only() {
        let (ctx, _) = context();
        let ent = user(&ctx, "ent", Role::Entrepreneur, KycStatus::Approved).await;
        let rival = user(&ctx, "rival", Role::Entrepreneur, KycStatus::Approved).await;
        let project = create(&ctx, &ent, new_project(false)).await.unwrap();

        let patch: ProjectPatch =
            serde_json::from_str(r#"{"status":"published","image_url":"http://evil"}"#).unwrap();
        assert!(update(&ctx, &rival, &project.id, patch.clone()).await.is_err());

        let updated = update(&ctx, &ent, &project.id, patch).await.unwrap();
        assert_eq!(updated.status, ProjectStatus::Published);
        assert!(updated.image_url.is_none());

        let updated = upload_media(
            &ctx,
            &ent,
            &project.id,
            MediaKind::PitchDeck,
            "deck.pptx",
            Bytes::from_static(b"deck"),
        )
        .await
        .unwrap();
        assert!(updated.pitch_deck_url.is_some());

        let err = upload_media(
            &ctx,
            &ent,
            &project.id,
            MediaKind::Video,
            "clip.avi",
            Bytes::from_static(b"avi"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.field(), Some("file"));
    }
}
