//! Structured discussion boards: boards, topics and posts.
//!
//! Reads go through a [`FlowSource`], which owns the request layer. A board's topic
//! list is exposed as a [`PagedSequence`] so large boards are streamed page by page.

use crate::error::{FetchError, WikiError};
use crate::pagination::{ContinuationArgs, Page, PageFetcher, PagedSequence, PaginationLink};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Extension a site must report before boards or topics can be opened on it
pub const FLOW_EXTENSION: &str = "Flow";

/// Content format used when none is asked for
pub const DEFAULT_FORMAT: &str = "wikitext";

/// Read access to a discussion-enabled site
pub trait FlowSource: Send + Sync {
    fn has_extension(&self, name: &str) -> bool;

    /// One page of a board's topic list
    fn load_board(&self, title: &str, args: &ContinuationArgs) -> Result<TopicListPage, FetchError>;

    /// A topic's own payload, in the topic-list shape
    fn load_topic(&self, title: &str) -> Result<TopicListPage, FetchError>;

    /// Current revision of one post, rendered in `format`
    fn load_post_current_revision(
        &self,
        topic: &str,
        uuid: &str,
        format: &str,
    ) -> Result<Value, FetchError>;
}

fn ensure_flow_enabled(source: &dyn FlowSource) -> Result<(), WikiError> {
    if source.has_extension(FLOW_EXTENSION) {
        Ok(())
    } else {
        Err(WikiError::Unsupported("site is not Flow-enabled".to_string()))
    }
}

/// Topic-list payload: `workflowId`, `roots`, `posts`, `revisions` and `links.pagination`
#[derive(Debug, Clone, PartialEq)]
pub struct TopicListPage {
    data: Value,
}

impl TopicListPage {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    pub fn as_value(&self) -> &Value {
        &self.data
    }

    pub fn workflow_id(&self) -> Result<String, FetchError> {
        self.data
            .get("workflowId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FetchError::Malformed("missing workflowId".to_string()))
    }

    /// Root post ids of the topics on this page. A missing list counts as empty.
    pub fn roots(&self) -> Result<Vec<String>, FetchError> {
        match self.data.get("roots") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(roots)) => roots
                .iter()
                .map(|root| {
                    root.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| FetchError::Malformed(format!("root id {}", root)))
                })
                .collect(),
            Some(other) => Err(FetchError::Malformed(format!("roots is not a list: {}", other))),
        }
    }

    /// Link to the next page: the first rule under `links.pagination`
    pub fn pagination(&self) -> Result<Option<PaginationLink>, FetchError> {
        let rule = match self.data.pointer("/links/pagination") {
            Some(Value::Object(rules)) => rules.values().next(),
            Some(Value::Array(rules)) => rules.first(),
            _ => None,
        };
        match rule {
            None => Ok(None),
            Some(rule) => rule
                .get("url")
                .and_then(Value::as_str)
                .map(|url| Some(PaginationLink::new(url)))
                .ok_or_else(|| FetchError::Malformed("pagination rule without url".to_string())),
        }
    }
}

/// A discussion board
pub struct Board {
    source: Arc<dyn FlowSource>,
    title: String,
}

impl Board {
    /// Open a board. Fails unless the site has the Flow extension.
    pub fn new(source: Arc<dyn FlowSource>, title: impl Into<String>) -> Result<Self, WikiError> {
        ensure_flow_enabled(source.as_ref())?;
        Ok(Self {
            source,
            title: title.into(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Workflow id of the board
    pub fn uuid(&self) -> Result<String, FetchError> {
        self.source
            .load_board(&self.title, &ContinuationArgs::new())?
            .workflow_id()
    }

    /// Topics of this board, fetched lazily page by page
    pub fn topics(&self, args: ContinuationArgs) -> PagedSequence<TopicPages> {
        PagedSequence::new(
            TopicPages {
                source: Arc::clone(&self.source),
                board: self.title.clone(),
            },
            args,
        )
    }
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board").field("title", &self.title).finish()
    }
}

/// Page fetcher behind [`Board::topics`]
pub struct TopicPages {
    source: Arc<dyn FlowSource>,
    board: String,
}

impl PageFetcher for TopicPages {
    type Item = Topic;

    fn fetch(&mut self, args: &ContinuationArgs) -> Result<Page<Topic>, FetchError> {
        debug!(board = %self.board, args = ?args, "Loading topic list");
        let page = self.source.load_board(&self.board, args)?;
        let roots = page
            .roots()?
            .iter()
            .map(|root| Topic::from_topiclist_data(Arc::clone(&self.source), root, &page))
            .collect::<Result<Vec<_>, _>>()?;
        // An empty page ends the sequence; its link is never followed.
        let pagination = if roots.is_empty() {
            None
        } else {
            page.pagination()?
        };
        Ok(Page { roots, pagination })
    }
}

/// A discussion topic, titled `Topic:<uuid>`
pub struct Topic {
    source: Arc<dyn FlowSource>,
    title: String,
    root: Option<Post>,
}

impl Topic {
    /// Open a topic by title. Fails unless the site has the Flow extension.
    pub fn new(source: Arc<dyn FlowSource>, title: impl Into<String>) -> Result<Self, WikiError> {
        ensure_flow_enabled(source.as_ref())?;
        Ok(Self {
            source,
            title: title.into(),
            root: None,
        })
    }

    /// Build a topic and its root post from a board's topic-list payload
    pub fn from_topiclist_data(
        source: Arc<dyn FlowSource>,
        root_uuid: &str,
        data: &TopicListPage,
    ) -> Result<Self, FetchError> {
        let title = format!("Topic:{}", root_uuid);
        let root = Post::from_data(Arc::clone(&source), &title, root_uuid, data.as_value())?;
        Ok(Self {
            source,
            title,
            root: Some(root),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Root post, loaded from the topic payload on first use
    pub fn root(&mut self) -> Result<&mut Post, FetchError> {
        if self.root.is_none() {
            let data = self.source.load_topic(&self.title)?;
            let uuid = data.workflow_id()?;
            self.root = Some(Post::from_data(
                Arc::clone(&self.source),
                &self.title,
                &uuid,
                data.as_value(),
            )?);
        }
        self.root
            .as_mut()
            .ok_or_else(|| FetchError::Malformed(format!("no root post for {}", self.title)))
    }

    /// Replies to the root post
    pub fn replies(&mut self) -> Result<&[Post], FetchError> {
        self.root()?.replies(DEFAULT_FORMAT, false)
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("title", &self.title)
            .field("root", &self.root.as_ref().map(Post::uuid))
            .finish()
    }
}

/// A post in a topic.
///
/// Content is cached per format; the current revision is what `replies` reads.
#[derive(Clone)]
pub struct Post {
    source: Arc<dyn FlowSource>,
    topic: String,
    uuid: String,
    content: HashMap<String, String>,
    current_revision: Option<Value>,
    replies: Option<Vec<Post>>,
}

impl Post {
    /// Reference a post without loading it. The uuid must not be empty.
    pub fn new(
        source: Arc<dyn FlowSource>,
        topic: impl Into<String>,
        uuid: impl Into<String>,
    ) -> Result<Self, WikiError> {
        let uuid = uuid.into();
        if uuid.is_empty() {
            return Err(WikiError::InvalidArgument(
                "post UUID must be provided".to_string(),
            ));
        }
        Ok(Self::unloaded(source, topic.into(), uuid))
    }

    fn unloaded(source: Arc<dyn FlowSource>, topic: String, uuid: String) -> Self {
        Self {
            source,
            topic,
            uuid,
            content: HashMap::new(),
            current_revision: None,
            replies: None,
        }
    }

    /// Build a post from a payload that carries its `posts` and `revisions` entries
    pub fn from_data(
        source: Arc<dyn FlowSource>,
        topic: &str,
        uuid: &str,
        data: &Value,
    ) -> Result<Self, FetchError> {
        if uuid.is_empty() {
            return Err(FetchError::Malformed("empty post id".to_string()));
        }
        let mut post = Self::unloaded(source, topic.to_string(), uuid.to_string());
        post.set_data(data)?;
        Ok(post)
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Title of the topic this post belongs to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn set_data(&mut self, data: &Value) -> Result<(), FetchError> {
        let revision_id = data
            .get("posts")
            .and_then(|posts| posts.get(&self.uuid))
            .and_then(|revisions| revisions.get(0))
            .and_then(revision_key)
            .ok_or_else(|| FetchError::Malformed(format!("no revision for post {}", self.uuid)))?;
        let mut revision = data
            .get("revisions")
            .and_then(|revisions| revisions.get(&revision_id))
            .cloned()
            .ok_or_else(|| FetchError::Malformed(format!("missing revision {}", revision_id)))?;

        if let Some(content) = revision.as_object_mut().and_then(|r| r.remove("content")) {
            let format = content.get("format").and_then(Value::as_str);
            let text = content.get("content").and_then(Value::as_str);
            if let (Some(format), Some(text)) = (format, text) {
                self.content.insert(format.to_string(), text.to_string());
            }
        }
        self.current_revision = Some(revision);
        Ok(())
    }

    fn load(&mut self, format: &str) -> Result<(), FetchError> {
        debug!(topic = %self.topic, post = %self.uuid, format, "Loading post revision");
        let data = self
            .source
            .load_post_current_revision(&self.topic, &self.uuid, format)?;
        self.set_data(&data)
    }

    /// Content in `format`, loading it on a cache miss or when `force` is set
    pub fn get(&mut self, format: &str, force: bool) -> Result<&str, FetchError> {
        if force || !self.content.contains_key(format) {
            self.load(format)?;
        }
        self.content.get(format).map(String::as_str).ok_or_else(|| {
            FetchError::Malformed(format!("no {} content for post {}", format, self.uuid))
        })
    }

    /// Replies listed by the current revision. Cached unless `force` is set.
    pub fn replies(&mut self, format: &str, force: bool) -> Result<&[Post], FetchError> {
        if force || self.replies.is_none() {
            if force || self.current_revision.is_none() {
                self.load(format)?;
            }
            let ids: Vec<String> = self
                .current_revision
                .as_ref()
                .and_then(|revision| revision.get("replies"))
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .filter_map(Value::as_str)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let replies = ids
                .into_iter()
                .map(|id| Self::unloaded(Arc::clone(&self.source), self.topic.clone(), id))
                .collect();
            self.replies = Some(replies);
        }
        Ok(self.replies.as_deref().unwrap_or_default())
    }
}

/// Revision ids come back as strings, occasionally as numbers
fn revision_key(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

impl std::fmt::Debug for Post {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Post")
            .field("topic", &self.topic)
            .field("uuid", &self.uuid)
            .field("formats", &self.content.keys().collect::<Vec<_>>())
            .finish()
    }
}
