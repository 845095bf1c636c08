//! The seam between the pipeline and the LLM.
//!
//! Production code uses [`ChatService`]; tests script replies through the same trait.
//! Every pipeline call goes through [`call_guarded`], which bounds it by a timeout and
//! races it against a cancellation token.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use ai_llm_service::{ChatMessage, ChatService};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::OracleError;

/// Chat completion as seen by the pipeline: `[system, ...history, user]` in, reply text out.
pub trait LlmOracle: Send + Sync {
    fn complete(
        &self,
        system: &str,
        history: &[ChatMessage],
        user: &str,
    ) -> impl Future<Output = Result<String, OracleError>> + Send;
}

impl LlmOracle for ChatService {
    async fn complete(
        &self,
        system: &str,
        history: &[ChatMessage],
        user: &str,
    ) -> Result<String, OracleError> {
        Ok(ChatService::complete(self, system, history, user).await?)
    }
}

impl<T: LlmOracle> LlmOracle for &T {
    fn complete(
        &self,
        system: &str,
        history: &[ChatMessage],
        user: &str,
    ) -> impl Future<Output = Result<String, OracleError>> + Send {
        (**self).complete(system, history, user)
    }
}

type BoxedReply<'a> = Pin<Box<dyn Future<Output = Result<String, OracleError>> + Send + 'a>>;

/// Object-safe twin of [`LlmOracle`].
trait ErasedOracle: Send + Sync {
    fn complete_boxed<'a>(
        &'a self,
        system: &'a str,
        history: &'a [ChatMessage],
        user: &'a str,
    ) -> BoxedReply<'a>;
}

impl<T: LlmOracle> ErasedOracle for T {
    fn complete_boxed<'a>(
        &'a self,
        system: &'a str,
        history: &'a [ChatMessage],
        user: &'a str,
    ) -> BoxedReply<'a> {
        Box::pin(self.complete(system, history, user))
    }
}

/// Type-erased oracle for callers that pick the backend at runtime.
#[derive(Clone)]
pub struct SharedOracle(Arc<dyn ErasedOracle>);

impl SharedOracle {
    pub fn new<O: LlmOracle + 'static>(oracle: O) -> Self {
        Self(Arc::new(oracle))
    }
}

impl LlmOracle for SharedOracle {
    async fn complete(
        &self,
        system: &str,
        history: &[ChatMessage],
        user: &str,
    ) -> Result<String, OracleError> {
        self.0.complete_boxed(system, history, user).await
    }
}

/// One oracle call bounded by `timeout` and abandoned as soon as `cancel` fires.
pub async fn call_guarded<O: LlmOracle>(
    oracle: &O,
    cancel: &CancellationToken,
    timeout: Duration,
    system: &str,
    history: &[ChatMessage],
    user: &str,
) -> Result<String, OracleError> {
    debug!(user_chars = user.chars().count(), ?timeout, "oracle call");
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OracleError::Cancelled),
        res = tokio::time::timeout(timeout, oracle.complete(system, history, user)) => match res {
            Ok(reply) => reply,
            Err(_) => {
                warn!(?timeout, "oracle call timed out");
                Err(OracleError::Timeout(timeout))
            }
        },
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted oracle shared by the unit tests of this crate.

    use std::{collections::VecDeque, sync::Mutex};

    use super::*;

    /// Pops one scripted reply per call and records every user message it receives.
    /// An exhausted script answers with `fallback`.
    #[derive(Default)]
    pub struct ScriptedOracle {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub fallback: Option<String>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedOracle {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
                ..Self::default()
            }
        }

        pub fn answering(reply: impl Into<String>) -> Self {
            Self {
                fallback: Some(reply.into()),
                ..Self::default()
            }
        }

        pub fn push_failure(&self, message: &str) {
            self.replies.lock().unwrap().push_back(Err(message.to_string()));
        }

        pub fn push_reply(&self, reply: impl Into<String>) {
            self.replies.lock().unwrap().push_back(Ok(reply.into()));
        }

        pub fn user_messages(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(_, u)| u.clone()).collect()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl LlmOracle for ScriptedOracle {
        async fn complete(
            &self,
            system: &str,
            _history: &[ChatMessage],
            user: &str,
        ) -> Result<String, OracleError> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(OracleError::Unavailable(message)),
                None => self
                    .fallback
                    .clone()
                    .ok_or_else(|| OracleError::Unavailable("script exhausted".into())),
            }
        }
    }

    /// Never answers.
    pub struct StalledOracle;

    impl LlmOracle for StalledOracle {
        async fn complete(
            &self,
            _system: &str,
            _history: &[ChatMessage],
            _user: &str,
        ) -> Result<String, OracleError> {
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn guarded_call_passes_reply_through() {
        let oracle = ScriptedOracle::new(["{}"]);
        let reply = call_guarded(
            &oracle,
            &CancellationToken::new(),
            Duration::from_secs(5),
            "sys",
            &[],
            "hi",
        )
        .await
        .unwrap();
        assert_eq!(reply, "{}");
        assert_eq!(oracle.user_messages(), vec!["hi"]);
    }

    #[tokio::test]
    async fn shared_oracle_forwards_to_its_backend() {
        let shared = SharedOracle::new(ScriptedOracle::new(["共享"]));
        let copy = shared.clone();
        let reply = call_guarded(
            &copy,
            &CancellationToken::new(),
            Duration::from_secs(5),
            "sys",
            &[],
            "hi",
        )
        .await
        .unwrap();
        assert_eq!(reply, "共享");
        assert!(shared.complete("sys", &[], "again").await.is_err());
    }

    #[tokio::test]
    async fn guarded_call_times_out() {
        let err = call_guarded(
            &StalledOracle,
            &CancellationToken::new(),
            Duration::from_millis(20),
            "sys",
            &[],
            "hi",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OracleError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn cancelled_token_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = call_guarded(&StalledOracle, &cancel, Duration::from_secs(1), "s", &[], "u")
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Cancelled));
    }
}
