//! Integration tests for paginated topic listings

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use wikibot::error::FetchError;
use wikibot::flow::{Board, FlowSource, TopicListPage, DEFAULT_FORMAT};
use wikibot::pagination::{ContinuationArgs, Page, PagedSequence};

/// Board served from canned topic-list pages, keyed by the `vtloffset` argument
struct CannedBoard {
    pages: Vec<Result<Value, FetchError>>,
    requests: Mutex<Vec<ContinuationArgs>>,
}

impl CannedBoard {
    fn new(pages: Vec<Result<Value, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ContinuationArgs> {
        self.requests.lock().clone()
    }
}

fn topic_page(roots: &[&str], next_offset: Option<usize>) -> Value {
    let mut posts = serde_json::Map::new();
    let mut revisions = serde_json::Map::new();
    for root in roots {
        let revision = format!("rev-{}", root);
        posts.insert(root.to_string(), json!([revision.clone()]));
        revisions.insert(
            revision,
            json!({
                "replies": [format!("{}-reply", root)],
                "content": { "format": "wikitext", "content": format!("Topic {}", root) }
            }),
        );
    }
    let mut page = json!({
        "workflowId": "board-uuid",
        "roots": roots,
        "posts": posts,
        "revisions": revisions,
    });
    if let Some(offset) = next_offset {
        page["links"] = json!({
            "pagination": {
                "fwd": {
                    "url": format!(
                        "https://wiki.example/w/index.php?title=Talk%3ASandbox&topiclist_offset={}&topiclist_limit=2",
                        offset
                    )
                }
            }
        });
    }
    page
}

impl FlowSource for CannedBoard {
    fn has_extension(&self, name: &str) -> bool {
        name == "Flow"
    }

    fn load_board(&self, _title: &str, args: &ContinuationArgs) -> Result<TopicListPage, FetchError> {
        let index = args
            .get("vtloffset")
            .and_then(|offset| offset.parse::<usize>().ok())
            .unwrap_or(0);
        self.requests.lock().push(args.clone());
        match self.pages.get(index) {
            Some(Ok(page)) => Ok(TopicListPage::new(page.clone())),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(TopicListPage::new(json!({ "roots": [] }))),
        }
    }

    fn load_topic(&self, title: &str) -> Result<TopicListPage, FetchError> {
        Err(FetchError::Request(format!("unexpected topic load for {}", title)))
    }

    fn load_post_current_revision(
        &self,
        _topic: &str,
        uuid: &str,
        _format: &str,
    ) -> Result<Value, FetchError> {
        Err(FetchError::Request(format!("unexpected post load for {}", uuid)))
    }
}

#[test]
fn test_board_topics_follow_pagination() {
    let source = CannedBoard::new(vec![
        Ok(topic_page(&["a", "b"], Some(1))),
        Ok(topic_page(&["c"], Some(2))),
        Ok(topic_page(&[], Some(3))),
    ]);
    let board = Board::new(source.clone(), "Talk:Sandbox").unwrap();

    let mut topics: Vec<_> = board
        .topics(ContinuationArgs::new())
        .collect::<Result<_, _>>()
        .unwrap();
    let titles: Vec<&str> = topics.iter().map(|topic| topic.title()).collect();
    assert_eq!(titles, vec!["Topic:a", "Topic:b", "Topic:c"]);

    let requests = source.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].is_empty());
    assert_eq!(requests[1].get("page").map(String::as_str), Some("Talk:Sandbox"));
    assert_eq!(requests[1].get("vtloffset").map(String::as_str), Some("1"));
    assert_eq!(requests[1].get("vtllimit").map(String::as_str), Some("2"));

    // Root posts come with content and replies from the topic list itself.
    let root = topics[2].root().unwrap();
    assert_eq!(root.uuid(), "c");
    assert_eq!(root.get(DEFAULT_FORMAT, false).unwrap(), "Topic c");
    let replies: Vec<&str> = root
        .replies(DEFAULT_FORMAT, false)
        .unwrap()
        .iter()
        .map(|post| post.uuid())
        .collect();
    assert_eq!(replies, vec!["c-reply"]);
}

#[test]
fn test_board_topics_are_fetched_on_demand() {
    let source = CannedBoard::new(vec![
        Ok(topic_page(&["a", "b"], Some(1))),
        Ok(topic_page(&["c"], None)),
    ]);
    let board = Board::new(source.clone(), "Talk:Sandbox").unwrap();

    let mut topics = board.topics(ContinuationArgs::new());
    assert!(source.requests().is_empty());

    let first_two: Vec<_> = topics.by_ref().take(2).map(Result::unwrap).collect();
    assert_eq!(first_two.len(), 2);
    assert_eq!(topics.pages_fetched(), 1);

    let rest: Vec<_> = topics.map(Result::unwrap).collect();
    assert_eq!(rest.len(), 1);
    assert_eq!(source.requests().len(), 2);
}

#[test]
fn test_fetch_error_ends_board_listing() {
    let source = CannedBoard::new(vec![
        Ok(topic_page(&["a"], Some(1))),
        Err(FetchError::Request("rate limited".to_string())),
        Ok(topic_page(&["z"], None)),
    ]);
    let board = Board::new(source, "Talk:Sandbox").unwrap();

    let results: Vec<_> = board.topics(ContinuationArgs::new()).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().title(), "Topic:a");
    assert_eq!(
        results[1].as_ref().err(),
        Some(&FetchError::Request("rate limited".to_string()))
    );
}

#[test]
fn test_malformed_page_is_reported() {
    let source = CannedBoard::new(vec![Ok(json!({ "roots": ["a"], "posts": {} }))]);
    let board = Board::new(source, "Talk:Sandbox").unwrap();

    let results: Vec<_> = board.topics(ContinuationArgs::new()).collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(FetchError::Malformed(_))));
}

#[test]
fn test_closure_fetcher_streams_pages() {
    let mut calls = 0;
    let fetcher = |_: &ContinuationArgs| {
        calls += 1;
        Ok::<_, FetchError>(match calls {
            1 => Page::new(vec![1, 2], Some(wikibot::pagination::PaginationLink::new(
                "https://wiki.example/w/api.php?topiclist_offset=2",
            ))),
            2 => Page::new(vec![3], Some(wikibot::pagination::PaginationLink::new(
                "https://wiki.example/w/api.php?topiclist_offset=3",
            ))),
            _ => Page::empty(),
        })
    };
    let items: Vec<i32> = PagedSequence::new(fetcher, ContinuationArgs::new())
        .map(Result::unwrap)
        .collect();
    assert_eq!(items, vec![1, 2, 3]);
}
