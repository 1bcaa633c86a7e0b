use super::Inbound;
use crate::{context::NodeContext, error::Result, queue::BoundedQueue};

/// Logs every payload and its source at `debug` level. Never sends.
#[derive(Debug, Clone)]
pub struct Observer {
    inbox: BoundedQueue<Inbound>,
}

impl Observer {
    /// Create an observer sharing the queue capacity and shutdown of `ctx`.
    pub fn new(ctx: &NodeContext) -> Self {
        Self {
            inbox: BoundedQueue::new(ctx.config().queue_capacity, ctx.shutdown().clone()),
        }
    }

    pub(crate) async fn on_message(&self, msg: &Inbound) -> Result<()> {
        self.inbox.enqueue(msg.clone()).await
    }

    pub(crate) async fn run(self) -> Result<()> {
        loop {
            let msg = self.inbox.dequeue().await?;
            tracing::debug!(source = %msg.source, payload = %msg.payload, "observed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::{
        test_support::{context, inbound, settle},
        Actor,
    };

    #[tokio::test]
    async fn test_observer_drains_inbox_until_shutdown() {
        let (ctx, _, queue) = context("A");
        let observer = Observer::new(&ctx);
        let actor: Actor = observer.clone().into();

        actor.on_message(&inbound("HELLO;B;1;30;0")).await.unwrap();
        actor.on_message(&inbound("garbage")).await.unwrap();
        let task = tokio::spawn(actor.run());
        settle().await;
        assert!(observer.inbox.is_empty());
        assert!(queue.is_empty());

        ctx.shutdown().trigger();
        assert!(task.await.unwrap().is_ok());
    }
}
