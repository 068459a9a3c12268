/*
    client - The poster client

    Ties the connection actor, the log query layer and the feed assembler
    together behind one handle:

        connect / switch_network  -> wait for the session to settle, then load the feed
        submit_post               -> gate on the session, send through the wallet, reload
        visible_posts(filter)     -> newest-first feed, optionally narrowed to one tag

    The loaded feed is only replaced by a successful query. A failed query is
    logged and the previous posts stay visible. A failed write keeps the draft.
*/

use crate::feed::{self, PostView};
use crate::ledger::{BlockTag, Receipt};
use crate::primitives::{Address, ChainId};
use crate::query::{PostQuery, QueryError};
use crate::tag::TagIndex;
use crate::wallet::{
    ConnectionError, ConnectionHandle, ConnectionState, PostRequest, ProviderError, SessionSnapshot, SharedProvider,
};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    /// Content or tag left empty
    #[error("Please fill all fields")]
    EmptyDraft,

    #[error("Wallet not connected")]
    NotConnected,

    #[error("Wrong network: switch to chain {required}")]
    WrongNetwork { active: Option<ChainId>, required: ChainId },

    /// The wallet or the ledger refused the write
    #[error("{0}")]
    WriteRejected(ProviderError),

    #[error("Failed to load posts: {0}")]
    Query(#[from] QueryError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Text being composed, kept until a write succeeds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostDraft {
    pub content: String,
    pub tag: String,
}

impl PostDraft {
    pub fn new(content: impl Into<String>, tag: impl Into<String>) -> Self {
        Self { content: content.into(), tag: tag.into() }
    }

    pub fn is_complete(&self) -> bool {
        !self.content.trim().is_empty() && !self.tag.trim().is_empty()
    }
}

pub struct PosterClient {
    connection: ConnectionHandle,
    provider: Option<SharedProvider>,
    query: PostQuery,
    tags: TagIndex,
    posts: RwLock<Vec<PostView>>,
    draft: Mutex<PostDraft>,
}

impl PosterClient {
    pub fn new(
        connection: ConnectionHandle,
        provider: Option<SharedProvider>,
        query: PostQuery,
        tags: TagIndex,
    ) -> Self {
        Self {
            connection,
            provider,
            query,
            tags,
            posts: RwLock::new(Vec::new()),
            draft: Mutex::new(PostDraft::default()),
        }
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn tag_index(&self) -> &TagIndex {
        &self.tags
    }

    pub fn contract(&self) -> Address {
        self.query.contract()
    }

    pub fn session(&self) -> SessionSnapshot {
        self.connection.snapshot()
    }

    /// Connect the wallet and, once on the required network, load the feed
    pub async fn connect(&self) -> ClientResult<SessionSnapshot> {
        self.connection.connect().await?;
        self.settle().await
    }

    /// Retry moving the wallet to the required network
    pub async fn switch_network(&self) -> ClientResult<SessionSnapshot> {
        self.connection.switch_network().await?;
        self.settle().await
    }

    async fn settle(&self) -> ClientResult<SessionSnapshot> {
        let snapshot = self.connection.wait_until_settled().await?;
        if snapshot.can_write() {
            // Failures are logged by load_feed and must not fail the connect
            let _ = self.load_feed().await;
        }
        Ok(snapshot)
    }

    /// Replay the whole post history and replace the loaded feed
    pub async fn load_feed(&self) -> ClientResult<usize> {
        match self.query.query_posts(BlockTag::Earliest, BlockTag::Latest).await {
            Ok(entries) => {
                let posts = feed::assemble(&entries);
                let count = posts.len();
                *self.posts.write().await = posts;
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, "Keeping previously loaded posts");
                Err(e.into())
            }
        }
    }

    pub async fn set_draft(&self, draft: PostDraft) {
        *self.draft.lock().await = draft;
    }

    pub async fn draft(&self) -> PostDraft {
        self.draft.lock().await.clone()
    }

    /// Submit the current draft as a post.
    ///
    /// Only attempted while connected to the required network. On success
    /// the draft is cleared and the feed reloaded; on failure the draft is
    /// kept and the wallet's error is returned as-is.
    pub async fn submit_post(&self) -> ClientResult<Receipt> {
        let result = self.try_submit().await;
        match &result {
            Ok(_) => crate::metrics::record_counter("client.posts.submitted", 1),
            Err(_) => crate::metrics::record_counter("client.posts.failed", 1),
        }
        result
    }

    async fn try_submit(&self) -> ClientResult<Receipt> {
        let draft = self.draft().await;
        if !draft.is_complete() {
            return Err(ClientError::EmptyDraft);
        }

        let session = self.connection.snapshot();
        if !session.can_write() {
            return Err(match session.state {
                ConnectionState::ConnectedWrongNetwork | ConnectionState::ConnectedCorrectNetwork => {
                    ClientError::WrongNetwork { active: session.active_chain, required: session.required_chain }
                }
                _ => ClientError::NotConnected,
            });
        }
        let from = session.signer.ok_or(ClientError::NotConnected)?;
        let provider = self.provider.as_ref().ok_or(ClientError::NotConnected)?;

        let request = PostRequest {
            from,
            to: self.query.contract(),
            content: draft.content.clone(),
            tag: self.tags.normalize(&draft.tag).into_owned(),
        };

        match provider.send_post(request).await {
            Ok(receipt) => {
                info!(tx = %receipt.transaction_hash, block = receipt.block_number, "Post submitted");
                {
                    let mut current = self.draft.lock().await;
                    if *current == draft {
                        *current = PostDraft::default();
                    }
                }
                // Failures are logged by load_feed; the write itself succeeded
                let _ = self.load_feed().await;
                Ok(receipt)
            }
            Err(e) => {
                warn!(error = %e, "Post rejected, draft kept");
                Err(ClientError::WriteRejected(e))
            }
        }
    }

    /// The loaded feed, newest first
    pub async fn posts(&self) -> Vec<PostView> {
        self.posts.read().await.clone()
    }

    /// The loaded feed narrowed to one tag; empty or absent shows everything
    pub async fn visible_posts(&self, tag: Option<&str>) -> Vec<PostView> {
        feed::filter(&self.posts.read().await, tag, &self.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{hash_tag, TagPolicy};
    use crate::test_utils::{fast_options, TestWorld, OTHER_CHAIN};
    use crate::wallet::{DevWalletBehaviour, WalletCall};

    #[tokio::test]
    async fn test_empty_draft_is_refused_before_gating() {
        let world = TestWorld::new().await;
        let (client, _task) = world.client(fast_options(), TagPolicy::Exact);

        client.set_draft(PostDraft::new("", "tag")).await;
        let err = client.submit_post().await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyDraft));
        assert_eq!(err.to_string(), "Please fill all fields");
    }

    #[tokio::test]
    async fn test_submit_refused_while_disconnected() {
        let world = TestWorld::new().await;
        let (client, _task) = world.client(fast_options(), TagPolicy::Exact);

        client.set_draft(PostDraft::new("hi", "tag")).await;
        assert!(matches!(client.submit_post().await, Err(ClientError::NotConnected)));
        assert!(!world.wallet.calls().await.iter().any(|c| matches!(c, WalletCall::SendPost { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_refused_on_wrong_network() {
        let world = TestWorld::on_chain(OTHER_CHAIN).await;
        world.wallet.set_behaviour(DevWalletBehaviour { reject_switch: true, ..Default::default() }).await;
        let (client, _task) = world.client(fast_options(), TagPolicy::Exact);

        let session = client.connect().await.unwrap();
        assert_eq!(session.state, ConnectionState::ConnectedWrongNetwork);

        client.set_draft(PostDraft::new("hi", "tag")).await;
        let err = client.submit_post().await.unwrap_err();
        assert!(matches!(err, ClientError::WrongNetwork { active: Some(OTHER_CHAIN), .. }));
        assert_eq!(client.draft().await, PostDraft::new("hi", "tag"));
        assert_eq!(world.other_ledger.head().await, 0);
    }

    #[tokio::test]
    async fn test_submit_clears_draft_and_reloads() {
        let world = TestWorld::new().await;
        let (client, _task) = world.client(fast_options(), TagPolicy::Exact);
        client.connect().await.unwrap();

        client.set_draft(PostDraft::new("Hello, world!", "hello")).await;
        let receipt = client.submit_post().await.unwrap();

        assert_eq!(client.draft().await, PostDraft::default());
        let posts = client.posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].transaction_hash, receipt.transaction_hash);
        assert_eq!(posts[0].author, world.account);
        assert_eq!(posts[0].tag_hash, hash_tag("hello"));
    }

    #[tokio::test]
    async fn test_rejected_write_keeps_draft_verbatim() {
        let world = TestWorld::new().await;
        let (client, _task) = world.client(fast_options(), TagPolicy::Exact);
        client.connect().await.unwrap();
        world.wallet.set_behaviour(DevWalletBehaviour { reject_transactions: true, ..Default::default() }).await;

        client.set_draft(PostDraft::new("keep me", "drafts")).await;
        match client.submit_post().await {
            Err(ClientError::WriteRejected(e)) => assert!(e.is_user_rejected()),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(client.draft().await, PostDraft::new("keep me", "drafts"));
        assert!(client.posts().await.is_empty());
    }

    #[tokio::test]
    async fn test_lowercase_policy_applies_to_both_paths() {
        let world = TestWorld::new().await;
        let (client, _task) = world.client(fast_options(), TagPolicy::Lowercase);
        client.connect().await.unwrap();

        client.set_draft(PostDraft::new("shouting", "NEWS")).await;
        client.submit_post().await.unwrap();

        assert_eq!(client.posts().await[0].tag_hash, hash_tag("news"));
        assert_eq!(client.visible_posts(Some("News")).await.len(), 1);
        assert_eq!(client.visible_posts(Some("news")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_visible_posts_filters_by_tag() {
        let world = TestWorld::new().await;
        world.seed_posts(&[("one", "a"), ("two", "b"), ("three", "a")]).await;
        let (client, _task) = world.client(fast_options(), TagPolicy::Exact);
        client.connect().await.unwrap();

        let all = client.visible_posts(None).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].content, "three");

        let tagged: Vec<_> = client.visible_posts(Some("a")).await.into_iter().map(|p| p.content).collect();
        assert_eq!(tagged, vec!["three", "one"]);
        assert_eq!(client.visible_posts(Some("")).await.len(), 3);
    }
}
