//! Carries out an engine [`Outcome`]: replies first, then payment links

use orderbot_core::{replies, CustomerId, Outcome, SideEffectCommand};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::messenger::MessageSender;
use crate::payment::PaymentLinkProvider;
use crate::{GatewayError, Result};

/// What happened while dispatching one outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub payment_links: usize,
    pub payment_failures: usize,
}

/// Executes side effects with a per-call timeout
#[derive(Clone)]
pub struct Dispatcher {
    payments: Arc<dyn PaymentLinkProvider>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(payments: Arc<dyn PaymentLinkProvider>, timeout: Duration) -> Self {
        Self { payments, timeout }
    }

    pub fn payment_provider(&self) -> &str {
        self.payments.name()
    }

    /// Send replies in order, then request any payment links. Session
    /// state was already committed by the engine, so failures here are
    /// logged and never retried.
    pub async fn dispatch(&self, sender: &dyn MessageSender, outcome: Outcome) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(customer) = outcome.customer else {
            return report;
        };

        for reply in &outcome.replies {
            self.deliver(sender, &customer, reply, &mut report).await;
        }

        for command in outcome.commands {
            let SideEffectCommand::RequestPaymentLink { customer, amount } = command else {
                continue;
            };

            let message = match self
                .bounded(self.payments.create_link(&customer, amount))
                .await
            {
                Ok(url) => {
                    report.payment_links += 1;
                    replies::payment_link(&url)
                }
                Err(e) => {
                    report.payment_failures += 1;
                    tracing::warn!(
                        customer = %customer,
                        provider = self.payments.name(),
                        "Payment link failed: {}",
                        e
                    );
                    replies::PAYMENT_FAILED.to_string()
                }
            };
            self.deliver(sender, &customer, &message, &mut report).await;
        }

        report
    }

    /// One message outside the engine, e.g. the text-only notice
    pub async fn notify(&self, sender: &dyn MessageSender, to: &CustomerId, body: &str) -> bool {
        let mut report = DispatchReport::default();
        self.deliver(sender, to, body, &mut report).await;
        report.failed == 0
    }

    async fn deliver(
        &self,
        sender: &dyn MessageSender,
        to: &CustomerId,
        body: &str,
        report: &mut DispatchReport,
    ) {
        match self.bounded(sender.send(to, body)).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(customer = %to, sender = sender.name(), "Failed to send message: {}", e);
            }
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))?
    }
}
