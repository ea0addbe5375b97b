use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use super::*;
use crate::anonymity::anonymous_number;

const SNAPSHOT_FILE: &str = "state.json";

#[derive(Default, Serialize, Deserialize)]
struct State {
    posts: HashMap<Id, Post>,
    comments: HashMap<Id, Comment>,
    post_reactions: HashMap<Id, HashMap<UserId, ReactionKind>>,
    comment_reactions: HashMap<Id, HashMap<UserId, ReactionKind>>,
    scraps: HashMap<Id, HashMap<UserId, DateTime<Utc>>>,
    reports: HashMap<Id, Report>,
    profiles: HashMap<UserId, Profile>,
    password_hashes: HashMap<UserId, String>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn email_taken(&self, email: &str, except: Option<&str>) -> bool {
        self.profiles.values().any(|p| p.email == email && Some(p.id.as_str()) != except)
    }

    fn remove_comment_rows(&mut self, ids: &[Id]) {
        for id in ids {
            self.comments.remove(id);
            self.comment_reactions.remove(id);
        }
    }
}

/// Process-local repository with an optional JSON snapshot on disk.
#[derive(Clone)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Option<Arc<PathBuf>>,
    // one snapshot writer at a time
    persist_lock: Arc<Mutex<()>>,
}

impl InMemRepo {
    fn data_dir() -> PathBuf {
        std::env::var("BOARD_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"))
    }

    /// Loads (and later persists to) `$BOARD_DATA_DIR/state.json`.
    pub fn new() -> Self {
        Self::with_snapshot(Self::data_dir().join(SNAPSHOT_FILE))
    }

    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load_state_from(&path);
        Self {
            state: Arc::new(RwLock::new(state)),
            snapshot_path: Some(Arc::new(path)),
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    /// No disk access at all.
    pub fn ephemeral() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            snapshot_path: None,
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    info!("loaded snapshot '{}'", path.display());
                    s
                }
                Err(e) => {
                    // move it aside; the next write would replace it
                    let aside = Self::sibling(path, &format!("corrupt-{}", Utc::now().timestamp()));
                    match std::fs::rename(path, &aside) {
                        Ok(()) => warn!(
                            "failed to parse snapshot '{}': {e}; moved to '{}', starting empty",
                            path.display(),
                            aside.display()
                        ),
                        Err(re) => error!("failed to parse snapshot '{}': {e}; could not move it aside: {re}", path.display()),
                    }
                    State::default()
                }
            },
            Err(e) => {
                info!("no snapshot at '{}' ({e}); starting empty", path.display());
                State::default()
            }
        }
    }

    fn sibling(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(format!(".{suffix}"));
        path.with_file_name(name)
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    /// Serializes the current state and swaps it in with a rename, so readers
    /// of the file only ever see a complete snapshot.
    fn persist(&self) {
        let Some(path) = self.snapshot_path.as_ref() else { return };
        let _guard = match self.persist_lock.lock() {
            Ok(g) => g,
            Err(_) => { error!("snapshot lock poisoned"); return; }
        };
        let bytes = match self.read().map(|s| serde_json::to_vec_pretty(&*s)) {
            Ok(Ok(b)) => b,
            Ok(Err(e)) => { error!("failed to serialize snapshot: {e}"); return; }
            Err(e) => { error!("failed to read state for snapshot: {e}"); return; }
        };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let tmp = Self::sibling(path, "tmp");
        let written = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, path.as_path()));
        if let Err(e) = written {
            error!("failed to write snapshot '{}': {e}", path.display());
        }
    }
}

impl Default for InMemRepo {
    fn default() -> Self { Self::new() }
}

fn newest_first<T>(v: &mut [T], at: impl Fn(&T) -> (DateTime<Utc>, Id)) {
    v.sort_by(|a, b| at(b).cmp(&at(a)));
}

#[async_trait]
impl PostRepo for InMemRepo {
    async fn list_posts(&self, query: &PostQuery) -> RepoResult<Vec<Post>> {
        let category = query.category_filter().map_err(RepoError::Invalid)?;
        let term = query.search_term();
        let s = self.read()?;
        let mut v: Vec<Post> = s.posts.values()
            .filter(|p| query.matches(p, category, term.as_deref()))
            .cloned()
            .collect();
        v.sort_by(|a, b| {
            b.is_pinned.cmp(&a.is_pinned)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        let (offset, limit) = query.window();
        Ok(v.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_visible_posts(&self) -> RepoResult<Vec<Post>> {
        let s = self.read()?;
        Ok(s.posts.values().filter(|p| !p.is_blinded).cloned().collect())
    }

    async fn list_posts_by_author(&self, author_id: &str) -> RepoResult<Vec<Post>> {
        let s = self.read()?;
        let mut v: Vec<Post> = s.posts.values().filter(|p| p.author_id == author_id).cloned().collect();
        newest_first(&mut v, |p| (p.created_at, p.id));
        Ok(v)
    }

    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        let s = self.read()?;
        s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_post(&self, author_id: &str, new: NewPost) -> RepoResult<Post> {
        let mut s = self.write()?;
        let id = s.next_id();
        let now = Utc::now();
        let post = Post {
            id,
            title: new.title,
            content: new.content,
            category: new.category,
            created_at: now,
            updated_at: now,
            likes_count: 0,
            dislikes_count: 0,
            comments_count: 0,
            scraps_count: 0,
            is_blinded: false,
            is_pinned: false,
            is_notice: new.category == Category::Notice,
            author_id: author_id.to_string(),
        };
        s.posts.insert(id, post.clone());
        drop(s);
        self.persist();
        Ok(post)
    }

    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
        let mut s = self.write()?;
        let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(t) = upd.title { post.title = t; }
        if let Some(c) = upd.content { post.content = c; }
        if let Some(c) = upd.category { post.category = c; }
        post.updated_at = Utc::now();
        let updated = post.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn set_post_flags(&self, id: Id, flags: PostFlags) -> RepoResult<Post> {
        let mut s = self.write()?;
        let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(v) = flags.is_pinned { post.is_pinned = v; }
        if let Some(v) = flags.is_notice { post.is_notice = v; }
        if let Some(v) = flags.is_blinded { post.is_blinded = v; }
        post.updated_at = Utc::now();
        let updated = post.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        if s.posts.remove(&id).is_none() { return Err(RepoError::NotFound); }
        let comment_ids: Vec<Id> = s.comments.values().filter(|c| c.post_id == id).map(|c| c.id).collect();
        s.remove_comment_rows(&comment_ids);
        s.post_reactions.remove(&id);
        s.scraps.remove(&id);
        drop(s);
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl CommentRepo for InMemRepo {
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
        let s = self.read()?;
        let mut v: Vec<Comment> = s.comments.values().filter(|c| c.post_id == post_id).cloned().collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn list_comments_by_author(&self, author_id: &str) -> RepoResult<Vec<Comment>> {
        let s = self.read()?;
        let mut v: Vec<Comment> = s.comments.values().filter(|c| c.author_id == author_id).cloned().collect();
        newest_first(&mut v, |c| (c.created_at, c.id));
        Ok(v)
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        let s = self.read()?;
        s.comments.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_comment(&self, author_id: &str, new: NewComment) -> RepoResult<Comment> {
        let mut s = self.write()?;
        if !s.posts.contains_key(&new.post_id) { return Err(RepoError::NotFound); }
        let parent_id = match new.parent_id {
            Some(pid) => {
                let parent = s.comments.get(&pid).ok_or(RepoError::NotFound)?;
                if parent.post_id != new.post_id { return Err(RepoError::NotFound); }
                Some(parent.parent_id.unwrap_or(parent.id))
            }
            None => None,
        };
        let id = s.next_id();
        let now = Utc::now();
        let comment = Comment {
            id,
            post_id: new.post_id,
            parent_id,
            content: new.content,
            is_anonymous: new.is_anonymous,
            anonymous_number: anonymous_number(author_id, new.post_id),
            likes_count: 0,
            dislikes_count: 0,
            created_at: now,
            updated_at: now,
            author_id: author_id.to_string(),
        };
        s.comments.insert(id, comment.clone());
        if let Some(post) = s.posts.get_mut(&new.post_id) { post.comments_count += 1; }
        drop(s);
        self.persist();
        Ok(comment)
    }

    async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment> {
        let mut s = self.write()?;
        let c = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
        c.content = content;
        c.updated_at = Utc::now();
        let updated = c.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn delete_comment(&self, id: Id) -> RepoResult<usize> {
        let mut s = self.write()?;
        let post_id = s.comments.get(&id).ok_or(RepoError::NotFound)?.post_id;
        let mut ids: Vec<Id> = s.comments.values().filter(|c| c.parent_id == Some(id)).map(|c| c.id).collect();
        ids.push(id);
        s.remove_comment_rows(&ids);
        if let Some(post) = s.posts.get_mut(&post_id) {
            post.comments_count = (post.comments_count - ids.len() as i64).max(0);
        }
        drop(s);
        self.persist();
        Ok(ids.len())
    }
}

#[async_trait]
impl ReactionRepo for InMemRepo {
    async fn react(
        &self,
        target: TargetType,
        target_id: Id,
        user_id: &str,
        kind: ReactionKind,
        blind_threshold: i64,
    ) -> RepoResult<ReactionOutcome> {
        let mut s = self.write()?;
        let exists = match target {
            TargetType::Post => s.posts.contains_key(&target_id),
            TargetType::Comment => s.comments.contains_key(&target_id),
        };
        if !exists { return Err(RepoError::NotFound); }

        let reactions = match target {
            TargetType::Post => s.post_reactions.entry(target_id).or_default(),
            TargetType::Comment => s.comment_reactions.entry(target_id).or_default(),
        };
        let current = reactions.get(user_id).copied();
        let next = toggled(current, kind);
        match next {
            Some(k) => { reactions.insert(user_id.to_string(), k); }
            None => { reactions.remove(user_id); }
        }
        let (dl, dd) = reaction_delta(current, next);

        let outcome = match target {
            TargetType::Post => {
                let post = s.posts.get_mut(&target_id).ok_or(RepoError::NotFound)?;
                post.likes_count = (post.likes_count + dl).max(0);
                post.dislikes_count = (post.dislikes_count + dd).max(0);
                if kind == ReactionKind::Dislike && post.dislikes_count >= blind_threshold {
                    post.is_blinded = true;
                }
                ReactionOutcome {
                    reaction: next,
                    likes_count: post.likes_count,
                    dislikes_count: post.dislikes_count,
                    is_blinded: post.is_blinded,
                }
            }
            TargetType::Comment => {
                let c = s.comments.get_mut(&target_id).ok_or(RepoError::NotFound)?;
                c.likes_count = (c.likes_count + dl).max(0);
                c.dislikes_count = (c.dislikes_count + dd).max(0);
                ReactionOutcome {
                    reaction: next,
                    likes_count: c.likes_count,
                    dislikes_count: c.dislikes_count,
                    is_blinded: false,
                }
            }
        };
        drop(s);
        self.persist();
        Ok(outcome)
    }

    async fn reaction_of(&self, target: TargetType, target_id: Id, user_id: &str) -> RepoResult<Option<ReactionKind>> {
        let s = self.read()?;
        let map = match target {
            TargetType::Post => s.post_reactions.get(&target_id),
            TargetType::Comment => s.comment_reactions.get(&target_id),
        };
        Ok(map.and_then(|m| m.get(user_id).copied()))
    }
}

#[async_trait]
impl ScrapRepo for InMemRepo {
    async fn toggle_scrap(&self, post_id: Id, user_id: &str) -> RepoResult<ScrapOutcome> {
        let mut s = self.write()?;
        if !s.posts.contains_key(&post_id) { return Err(RepoError::NotFound); }
        let users = s.scraps.entry(post_id).or_default();
        let scrapped = if users.remove(user_id).is_some() {
            false
        } else {
            users.insert(user_id.to_string(), Utc::now());
            true
        };
        let post = s.posts.get_mut(&post_id).ok_or(RepoError::NotFound)?;
        post.scraps_count = (post.scraps_count + if scrapped { 1 } else { -1 }).max(0);
        let outcome = ScrapOutcome { scrapped, scraps_count: post.scraps_count };
        drop(s);
        self.persist();
        Ok(outcome)
    }

    async fn is_scrapped(&self, post_id: Id, user_id: &str) -> RepoResult<bool> {
        let s = self.read()?;
        Ok(s.scraps.get(&post_id).map(|m| m.contains_key(user_id)).unwrap_or(false))
    }

    async fn list_scrapped_posts(&self, user_id: &str) -> RepoResult<Vec<Post>> {
        let s = self.read()?;
        let mut hits: Vec<(DateTime<Utc>, Post)> = s.scraps.iter()
            .filter_map(|(pid, users)| {
                let at = users.get(user_id)?;
                s.posts.get(pid).map(|p| (*at, p.clone()))
            })
            .collect();
        hits.sort_by(|(a, pa), (b, pb)| b.cmp(a).then_with(|| pb.id.cmp(&pa.id)));
        Ok(hits.into_iter().map(|(_, p)| p).collect())
    }
}

#[async_trait]
impl ReportRepo for InMemRepo {
    async fn create_report(&self, reporter_id: &str, new: NewReport) -> RepoResult<Report> {
        let mut s = self.write()?;
        let exists = match new.target_type {
            TargetType::Post => s.posts.contains_key(&new.target_id),
            TargetType::Comment => s.comments.contains_key(&new.target_id),
        };
        if !exists { return Err(RepoError::NotFound); }
        let duplicate = s.reports.values().any(|r| {
            r.reporter_id == reporter_id
                && r.target_type == new.target_type
                && r.target_id == new.target_id
                && r.status == ReportStatus::Pending
        });
        if duplicate { return Err(RepoError::Conflict); }
        let id = s.next_id();
        let now = Utc::now();
        let report = Report {
            id,
            reporter_id: reporter_id.to_string(),
            target_type: new.target_type,
            target_id: new.target_id,
            reason: new.reason,
            status: ReportStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        s.reports.insert(id, report.clone());
        drop(s);
        self.persist();
        Ok(report)
    }

    async fn list_reports(&self, status: Option<ReportStatus>) -> RepoResult<Vec<Report>> {
        let s = self.read()?;
        let mut v: Vec<Report> = s.reports.values()
            .filter(|r| status.map(|st| r.status == st).unwrap_or(true))
            .cloned()
            .collect();
        newest_first(&mut v, |r| (r.created_at, r.id));
        Ok(v)
    }

    async fn get_report(&self, id: Id) -> RepoResult<Report> {
        let s = self.read()?;
        s.reports.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn set_report_status(&self, id: Id, status: ReportStatus) -> RepoResult<Report> {
        let mut s = self.write()?;
        let r = s.reports.get_mut(&id).ok_or(RepoError::NotFound)?;
        r.status = status;
        r.updated_at = Utc::now();
        let updated = r.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn delete_report(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        s.reports.remove(&id).ok_or(RepoError::NotFound)?;
        drop(s);
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl ProfileRepo for InMemRepo {
    async fn get_profile(&self, id: &str) -> RepoResult<Profile> {
        let s = self.read()?;
        s.profiles.get(id).cloned().ok_or(RepoError::NotFound)
    }

    async fn get_profile_by_email(&self, email: &str) -> RepoResult<Profile> {
        let email = email.trim().to_lowercase();
        let s = self.read()?;
        s.profiles.values().find(|p| p.email == email).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_profile(&self, new: NewProfile) -> RepoResult<Profile> {
        let email = new.email.trim().to_lowercase();
        let mut s = self.write()?;
        if s.profiles.contains_key(&new.id) || s.email_taken(&email, None) {
            return Err(RepoError::Conflict);
        }
        let now = Utc::now();
        let profile = Profile {
            id: new.id.clone(),
            email,
            nickname: new.nickname,
            role: new.role,
            is_blocked: false,
            avatar_hash: None,
            created_at: now,
            updated_at: now,
        };
        s.profiles.insert(new.id.clone(), profile.clone());
        if let Some(h) = new.password_hash { s.password_hashes.insert(new.id, h); }
        drop(s);
        self.persist();
        Ok(profile)
    }

    async fn update_profile(&self, id: &str, upd: UpdateProfile) -> RepoResult<Profile> {
        let mut s = self.write()?;
        let email = upd.email.map(|e| e.trim().to_lowercase());
        if let Some(ref e) = email {
            if s.email_taken(e, Some(id)) { return Err(RepoError::Conflict); }
        }
        if let Some(h) = upd.password_hash {
            if !s.profiles.contains_key(id) { return Err(RepoError::NotFound); }
            s.password_hashes.insert(id.to_string(), h);
        }
        let p = s.profiles.get_mut(id).ok_or(RepoError::NotFound)?;
        if let Some(n) = upd.nickname { p.nickname = n; }
        if let Some(e) = email { p.email = e; }
        if let Some(a) = upd.avatar_hash { p.avatar_hash = Some(a); }
        p.updated_at = Utc::now();
        let updated = p.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn set_role(&self, id: &str, role: ProfileRole) -> RepoResult<Profile> {
        let mut s = self.write()?;
        let p = s.profiles.get_mut(id).ok_or(RepoError::NotFound)?;
        p.role = role;
        p.updated_at = Utc::now();
        let updated = p.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn set_blocked(&self, id: &str, blocked: bool) -> RepoResult<Profile> {
        let mut s = self.write()?;
        let p = s.profiles.get_mut(id).ok_or(RepoError::NotFound)?;
        p.is_blocked = blocked;
        p.updated_at = Utc::now();
        let updated = p.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn list_blocked(&self) -> RepoResult<Vec<Profile>> {
        let s = self.read()?;
        let mut v: Vec<Profile> = s.profiles.values().filter(|p| p.is_blocked).cloned().collect();
        v.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(v)
    }

    async fn credentials_by_email(&self, email: &str) -> RepoResult<Credentials> {
        let email = email.trim().to_lowercase();
        let s = self.read()?;
        let p = s.profiles.values().find(|p| p.email == email).ok_or(RepoError::NotFound)?;
        let hash = s.password_hashes.get(&p.id).ok_or(RepoError::NotFound)?;
        Ok(Credentials { user_id: p.id.clone(), password_hash: hash.clone() })
    }
}
