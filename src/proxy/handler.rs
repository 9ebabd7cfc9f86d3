//! Policy request handler
//!
//! Routes each query to its domain, picks the first matching rule and
//! executes its action. Every path ends in exactly one audit event.

use crate::dns::{error_response, Message, OpCode, ResponseCode};
use crate::proxy::audit::{AuditEvent, Outcome};
use crate::proxy::filter::{answer_addresses, excluded_address};
use crate::proxy::forward::Forwarder;
use crate::rules::query_type::query_type_name;
use crate::rules::{canonical_name, Action, RuleStore};
use crate::server::{RequestContext, RequestHandler};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Applies the active rule set to inbound queries
pub struct PolicyHandler {
    store: Arc<RuleStore>,
    forwarder: Forwarder,
}

impl PolicyHandler {
    /// Create a handler reading rules from `store`
    pub fn new(store: Arc<RuleStore>, forwarder: Forwarder) -> Self {
        Self { store, forwarder }
    }

    /// Decide the reply for one query and fill in the audit fields
    async fn decide(&self, ctx: &RequestContext, audit: &mut AuditEvent) -> Message {
        let request = &ctx.message;

        if let Some(query) = request.queries().first() {
            audit.qname = canonical_name(&query.name().to_ascii());
            audit.qtype = query_type_name(u16::from(query.query_type()));
        }

        if request.op_code() != OpCode::Query {
            audit.outcome = Outcome::NotImplemented;
            return error_response(request, ResponseCode::NotImp);
        }

        if request.queries().len() != 1 {
            info!(
                client = %ctx.client_addr(),
                questions = request.queries().len(),
                "request must carry exactly one question"
            );
            audit.outcome = Outcome::BadQuestionCount;
            return error_response(request, ResponseCode::ServFail);
        }

        let query = &request.queries()[0];
        let qtype = u16::from(query.query_type());
        let name = audit.qname.clone();

        // Held for the whole request so a reload cannot change the answer midway
        let ruleset = self.store.snapshot();

        let Some(domain) = ruleset.route(&name) else {
            audit.outcome = Outcome::NoDomain;
            return error_response(request, ResponseCode::Refused);
        };
        audit.domain = Some(domain.name.clone());
        debug!(qname = %name, domain = %domain.name, "selected domain");

        let Some(hit) = domain.evaluate(qtype, &name, ctx.client_ip()) else {
            audit.outcome = Outcome::NoRule;
            return error_response(request, ResponseCode::Refused);
        };
        audit.rule_index = Some(hit.index);
        audit.rule = Some(hit.rule.name.clone());

        match hit.rule.then.action {
            Action::Refuse => {
                audit.outcome = Outcome::Refused;
                error_response(request, ResponseCode::Refused)
            }
            Action::Fail => {
                audit.outcome = Outcome::Failed;
                error_response(request, ResponseCode::ServFail)
            }
            Action::Forward => {
                let Some(target) = hit.rule.then.pick_target() else {
                    warn!(rule = %hit.rule.name, "forward rule without targets");
                    audit.outcome = Outcome::UpstreamError;
                    return error_response(request, ResponseCode::ServFail);
                };
                audit.target = Some(target);

                let reply = match self.forwarder.exchange(request, target, ctx.protocol).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(
                            %target,
                            qname = %name,
                            client = %ctx.client_addr(),
                            error = %e,
                            "error while forwarding request"
                        );
                        audit.outcome = Outcome::UpstreamError;
                        return error_response(request, ResponseCode::ServFail);
                    }
                };

                audit.upstream_rcode = Some(reply.response_code().to_string());
                audit.answers = answer_addresses(&reply);

                if let Some(addr) = excluded_address(&audit.answers, &hit.rule.matcher) {
                    info!(
                        %target,
                        qname = %name,
                        address = %addr,
                        rule = %hit.rule.name,
                        "upstream answer in excluded range, refusing"
                    );
                    audit.excluded = Some(addr);
                    audit.outcome = Outcome::Filtered;
                    return error_response(request, ResponseCode::Refused);
                }

                audit.outcome = Outcome::Forwarded;
                reply
            }
        }
    }
}

#[async_trait]
impl RequestHandler for PolicyHandler {
    async fn handle(&self, ctx: RequestContext) -> Result<Message> {
        let started = Instant::now();
        let mut audit = AuditEvent {
            protocol: ctx.protocol.to_string(),
            client: ctx.client_addr(),
            qname: String::new(),
            qtype: String::new(),
            domain: None,
            rule_index: None,
            rule: None,
            outcome: Outcome::NoDomain,
            target: None,
            rcode: String::new(),
            upstream_rcode: None,
            answers: Vec::new(),
            excluded: None,
            elapsed_ms: 0,
        };

        let response = self.decide(&ctx, &mut audit).await;

        audit.rcode = response.response_code().to_string();
        audit.elapsed_ms = started.elapsed().as_millis() as u64;
        audit.emit();

        Ok(response)
    }
}
