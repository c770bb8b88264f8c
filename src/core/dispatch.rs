//! 命令分发：每个 Actor 一条通道 + 一个消费任务，按 Drop 策略排序
//!
//! - 同一 Actor 的命令按发布顺序逐条处理，不会并行重叠
//! - 某一类命令（[`Command::kind`]）正在处理时，再发布的同类命令直接丢弃，不排队；
//!   仅在排队、尚未开始处理的命令不参与丢弃判断
//! - 发布方通过 oneshot 等待处理结果，可用 CancellationToken 放弃等待

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// 可分发的命令：`kind` 决定 Drop 策略的分组
pub trait Command: Send + 'static {
    fn kind(&self) -> &'static str;
}

/// Actor 的命令处理器；由消费任务独占，因此可以持有 `&mut self` 状态
#[async_trait]
pub trait Handler<C: Command>: Send + 'static {
    type Output: Send + 'static;

    async fn handle(&mut self, command: C, cancel: CancellationToken) -> Self::Output;
}

struct Envelope<C, R> {
    command: C,
    kind: &'static str,
    cancel: CancellationToken,
    reply: oneshot::Sender<R>,
}

/// 非阻塞提交的结果
#[derive(Debug)]
pub enum Submission<R> {
    /// 已入队，可等待处理结果
    Accepted(oneshot::Receiver<R>),
    /// 同类命令仍在处理中，已丢弃
    Dropped,
    /// Actor 已关闭
    Closed,
}

/// 发布并等待的结果
#[derive(Debug)]
pub enum Delivery<R> {
    Completed(R),
    Dropped,
    Cancelled,
    Closed,
}

impl<R> Delivery<R> {
    pub fn completed(self) -> Option<R> {
        match self {
            Self::Completed(output) => Some(output),
            _ => None,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped)
    }
}

/// 正在处理的命令类别（单消费任务，同一时刻至多一个）
type Processing = Arc<Mutex<Option<&'static str>>>;

fn mark(processing: &Processing, kind: Option<&'static str>) {
    *processing.lock().unwrap_or_else(PoisonError::into_inner) = kind;
}

/// 单个 Actor 的发送端（可克隆，所有克隆指向同一消费任务）
pub struct Dispatcher<C: Command, R> {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Envelope<C, R>>,
    processing: Processing,
    stop: CancellationToken,
}

impl<C: Command, R> Clone for Dispatcher<C, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tx: self.tx.clone(),
            processing: self.processing.clone(),
            stop: self.stop.clone(),
        }
    }
}

impl<C: Command, R> std::fmt::Debug for Dispatcher<C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("closed", &self.stop.is_cancelled())
            .finish()
    }
}

impl<C: Command, R: Send + 'static> Dispatcher<C, R> {
    /// 启动消费任务（需在 tokio 运行时内调用）
    pub fn spawn<H>(name: impl Into<Arc<str>>, mut handler: H) -> Self
    where
        H: Handler<C, Output = R>,
    {
        let name: Arc<str> = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope<C, R>>();
        let processing: Processing = Arc::new(Mutex::new(None));
        let stop = CancellationToken::new();

        let actor = name.clone();
        let current = processing.clone();
        let stopped = stop.clone();
        tokio::spawn(async move {
            loop {
                let envelope = tokio::select! {
                    _ = stopped.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(envelope) => envelope,
                        None => break,
                    },
                };

                let Envelope {
                    command,
                    kind,
                    cancel,
                    reply,
                } = envelope;
                tracing::trace!(actor = %actor, kind, "handling command");
                mark(&current, Some(kind));
                let output = handler.handle(command, cancel).await;
                // 先清除标记再回复，保证等待方收到结果后可立即再次发布同类命令
                mark(&current, None);
                let _ = reply.send(output);
            }
            tracing::debug!(actor = %actor, "dispatcher stopped");
        });

        Self {
            name,
            tx,
            processing,
            stop,
        }
    }

    /// 非阻塞提交：同类命令正在处理时丢弃，否则排队
    pub fn submit(&self, command: C, cancel: CancellationToken) -> Submission<R> {
        if self.stop.is_cancelled() {
            return Submission::Closed;
        }

        let kind = command.kind();
        if self.is_busy(kind) {
            tracing::debug!(actor = %self.name, kind, "command dropped: same kind is being handled");
            return Submission::Dropped;
        }

        let (reply, rx) = oneshot::channel();
        let envelope = Envelope {
            command,
            kind,
            cancel,
            reply,
        };
        if self.tx.send(envelope).is_err() {
            return Submission::Closed;
        }
        Submission::Accepted(rx)
    }

    /// 提交并等待处理结果；`cancel` 触发时停止等待（处理器同样会收到该 token）
    pub async fn publish(&self, command: C, cancel: CancellationToken) -> Delivery<R> {
        match self.submit(command, cancel.clone()) {
            Submission::Accepted(rx) => tokio::select! {
                biased;
                result = rx => match result {
                    Ok(output) => Delivery::Completed(output),
                    Err(_) => Delivery::Closed,
                },
                _ = cancel.cancelled() => Delivery::Cancelled,
            },
            Submission::Dropped => Delivery::Dropped,
            Submission::Closed => Delivery::Closed,
        }
    }

    /// 某类命令是否正在处理（排队中的不算）
    pub fn is_busy(&self, kind: &str) -> bool {
        self.processing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|current| current == kind)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 停止消费任务；尚未处理的命令的等待方得到 [`Delivery::Closed`]
    pub fn close(&self) {
        self.stop.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.stop.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;

    #[derive(Debug)]
    enum Probe {
        Slow(u32),
        Fast(u32),
    }

    impl Command for Probe {
        fn kind(&self) -> &'static str {
            match self {
                Self::Slow(_) => "slow",
                Self::Fast(_) => "fast",
            }
        }
    }

    struct Recorder {
        gate: Arc<Notify>,
        seen: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl Handler<Probe> for Recorder {
        type Output = u32;

        async fn handle(&mut self, command: Probe, cancel: CancellationToken) -> u32 {
            let n = match command {
                Probe::Slow(n) => {
                    tokio::select! {
                        _ = self.gate.notified() => {}
                        _ = cancel.cancelled() => return 0,
                    }
                    n
                }
                Probe::Fast(n) => n,
            };
            self.seen.lock().unwrap().push(n);
            n
        }
    }

    fn recorder() -> (Dispatcher<Probe, u32>, Arc<Notify>, Arc<Mutex<Vec<u32>>>) {
        let gate = Arc::new(Notify::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::spawn(
            "probe",
            Recorder {
                gate: gate.clone(),
                seen: seen.clone(),
            },
        );
        (dispatcher, gate, seen)
    }

    /// 等到消费任务开始处理该类命令
    async fn wait_busy(dispatcher: &Dispatcher<Probe, u32>, kind: &str) {
        while !dispatcher.is_busy(kind) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_same_kind_dropped_while_handled() {
        let (dispatcher, gate, _) = recorder();

        let first = dispatcher.submit(Probe::Slow(1), CancellationToken::new());
        assert!(matches!(first, Submission::Accepted(_)));
        wait_busy(&dispatcher, "slow").await;

        let second = dispatcher.submit(Probe::Slow(2), CancellationToken::new());
        assert!(matches!(second, Submission::Dropped));

        gate.notify_one();
        let Submission::Accepted(rx) = first else {
            unreachable!()
        };
        assert_eq!(rx.await.unwrap(), 1);
        assert!(!dispatcher.is_busy("slow"));

        gate.notify_one();
        let third = dispatcher
            .publish(Probe::Slow(3), CancellationToken::new())
            .await;
        assert!(matches!(third, Delivery::Completed(3)));
    }

    #[tokio::test]
    async fn test_queued_same_kind_is_not_dropped() {
        let (dispatcher, gate, seen) = recorder();

        let slow = dispatcher.submit(Probe::Slow(1), CancellationToken::new());
        wait_busy(&dispatcher, "slow").await;

        // 两条 fast 都只是排队，没有 fast 正在处理，因此都被接受
        let second = dispatcher.submit(Probe::Fast(2), CancellationToken::new());
        let third = dispatcher.submit(Probe::Fast(3), CancellationToken::new());
        assert!(!dispatcher.is_busy("fast"));

        gate.notify_one();
        let (Submission::Accepted(slow), Submission::Accepted(second), Submission::Accepted(third)) =
            (slow, second, third)
        else {
            panic!("queued commands should be accepted");
        };
        assert_eq!(slow.await.unwrap(), 1);
        assert_eq!(second.await.unwrap(), 2);
        assert_eq!(third.await.unwrap(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_other_kinds_queue_in_publish_order() {
        let (dispatcher, gate, seen) = recorder();

        let slow = dispatcher.submit(Probe::Slow(1), CancellationToken::new());
        let fast = dispatcher.submit(Probe::Fast(2), CancellationToken::new());
        assert!(matches!(fast, Submission::Accepted(_)));

        gate.notify_one();
        let (Submission::Accepted(slow), Submission::Accepted(fast)) = (slow, fast) else {
            unreachable!()
        };
        assert_eq!(fast.await.unwrap(), 2);
        assert_eq!(slow.await.unwrap(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_publish_cancelled() {
        let (dispatcher, _gate, seen) = recorder();
        let cancel = CancellationToken::new();

        let pending = dispatcher.publish(Probe::Slow(7), cancel.clone());
        cancel.cancel();
        assert!(matches!(pending.await, Delivery::Cancelled));

        // 处理器收到同一 token 后提前返回，标记随之释放
        tokio::task::yield_now().await;
        let again = dispatcher
            .publish(Probe::Fast(8), CancellationToken::new())
            .await;
        assert_eq!(again.completed(), Some(8));
        assert!(!seen.lock().unwrap().contains(&7));
    }

    #[tokio::test]
    async fn test_closed_dispatcher_rejects() {
        let (dispatcher, _gate, _) = recorder();
        dispatcher.close();
        assert!(dispatcher.is_closed());
        let result = dispatcher
            .publish(Probe::Fast(1), CancellationToken::new())
            .await;
        assert!(matches!(result, Delivery::Closed));
    }
}
