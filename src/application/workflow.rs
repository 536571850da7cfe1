use std::sync::Arc;

use serde_json::{Map, Value};

use crate::application::Settings;
use crate::application::payment::PaymentSubworkflow;
use crate::domain::config::FormConfig;
use crate::domain::participant::{DataId, Participant};
use crate::domain::payment::PaymentInfo;
use crate::domain::ports::{
    FieldError, FormEngineRef, FormValidation, MarkdownRendererRef, ParticipantRepositoryRef,
    PaymentGatewayRef, ScriptEvaluatorRef, SessionState,
};
use crate::domain::request::RegistrationRequest;
use crate::domain::view::{FormError, MessageKey, ViewModel};
use crate::error::{RegistrationError, Result};

/// Session flag set right before the post-submission redirect; the next view
/// of the edit page is the confirmation, exactly once.
pub const CONFIRMATION_FLAG: &str = "registration_confirmation";

/// Session flag set when the visitor returns from the payment gateway.
pub const PAYMENT_SUCCESS_RETURN_FLAG: &str = "payment_success_return";

/// The main entry point of the registration controller.
///
/// Resolves the request mode, loads the participant, dispatches to the
/// cancellation, payment or form logic and assembles the view model. All
/// authoritative state lives behind the collaborator ports; one call handles
/// one request from start to finish.
pub struct RegistrationWorkflow {
    repo: ParticipantRepositoryRef,
    form_engine: FormEngineRef,
    payment: PaymentSubworkflow,
    config: Arc<FormConfig>,
    settings: Arc<Settings>,
}

impl RegistrationWorkflow {
    pub fn new(
        repo: ParticipantRepositoryRef,
        form_engine: FormEngineRef,
        gateway: PaymentGatewayRef,
        evaluator: ScriptEvaluatorRef,
        markdown: MarkdownRendererRef,
        config: FormConfig,
        settings: Settings,
    ) -> Self {
        let config = Arc::new(config);
        let settings = Arc::new(settings);
        Self {
            repo,
            form_engine,
            payment: PaymentSubworkflow::new(
                gateway,
                evaluator,
                markdown,
                config.clone(),
                settings.clone(),
            ),
            config,
            settings,
        }
    }

    /// Handles one request. The only error that escapes is the
    /// internal-method invariant violation from the payment flow; everything
    /// else becomes a view model.
    pub async fn run(
        &self,
        request: &RegistrationRequest,
        session: &dyn SessionState,
    ) -> Result<ViewModel> {
        // A gateway-return link may be stale or bookmarked with its query
        // parameters intact; stash a one-shot flag and bounce to the clean
        // edit URL.
        if request.payment_success_return {
            session.set_flag(PAYMENT_SUCCESS_RETURN_FLAG).await;
            let target = match &request.data_id {
                Some(id) => request.edit_target(id),
                None => request.path.clone(),
            };
            return Ok(ViewModel::redirect(target));
        }

        let mut participant = None;
        if let Some(data_id) = &request.data_id {
            let fields = self.config.participant_fields();
            match self
                .repo
                .fetch(&self.settings.registration, data_id, &fields)
                .await
            {
                Ok(p) => participant = Some(p),
                Err(RegistrationError::NotFound) => {
                    return Ok(ViewModel::Error { is_not_found: true });
                }
                Err(err) => {
                    tracing::error!(%err, data_id = %data_id, "failed to load participant");
                    return Ok(ViewModel::Error {
                        is_not_found: false,
                    });
                }
            }
        }

        // Once cancelled, always cancelled: the flags cannot resurrect the
        // registration, and payment is no longer reachable.
        let cancelled = participant.as_ref().is_some_and(Participant::is_cancelled);
        let is_cancellation = request.is_cancellation && !cancelled;
        let is_actual_cancellation = request.is_actual_cancellation && !cancelled;

        if let Some(p) = &participant
            && !cancelled
            && request.is_payment
        {
            return self.payment.run(p, request, session).await;
        }

        self.run_form(
            participant,
            request,
            is_cancellation,
            is_actual_cancellation,
            session,
        )
        .await
    }

    /// Looks up the visitor's own active registration, if any: the first
    /// non-cancelled record belonging to the codeholder.
    pub async fn find_data_id_for_codeholder(&self, codeholder_id: i64) -> Result<Option<DataId>> {
        let participants = self
            .repo
            .list_by_codeholder(&self.settings.registration, codeholder_id)
            .await?;
        Ok(participants
            .into_iter()
            .find(|p| p.codeholder_id == Some(codeholder_id) && !p.is_cancelled())
            .map(|p| p.data_id))
    }

    async fn run_form(
        &self,
        participant: Option<Participant>,
        request: &RegistrationRequest,
        is_cancellation: bool,
        is_actual_cancellation: bool,
        session: &dyn SessionState,
    ) -> Result<ViewModel> {
        let mut cancelled_time = participant.as_ref().and_then(|p| p.cancelled_time);
        let is_confirmation = session.take_flag(CONFIRMATION_FLAG).await;
        let is_submission = !is_cancellation && request.is_post();
        let back_target = request.back_target();

        let mut cancel_succeeded = false;
        let mut form_error: Option<FormError> = None;
        let mut submitted_data_id: Option<DataId> = None;
        let mut attempted_post: Option<Map<String, Value>> = None;

        if cancelled_time.is_none() {
            if is_actual_cancellation {
                if let Some(p) = &participant {
                    match self.repo.cancel(&self.settings.registration, &p.data_id).await {
                        Ok(time) => {
                            cancelled_time = Some(time);
                            cancel_succeeded = true;
                        }
                        Err(err) => {
                            tracing::error!(%err, data_id = %p.data_id, "cancellation failed");
                        }
                    }
                }
            } else if is_submission {
                let post = request.post.clone().unwrap_or_default();
                if request.validate_only {
                    form_error = self.validate_only(participant.as_ref(), &post).await;
                } else {
                    let nonce_valid = match post.get("nonce").and_then(Value::as_str) {
                        Some(nonce) => session.consume_nonce(nonce).await,
                        None => false,
                    };
                    if nonce_valid {
                        match self.try_submit(participant.as_ref(), &post).await {
                            Ok(Ok(data_id)) => submitted_data_id = Some(data_id),
                            Ok(Err(fields)) => {
                                form_error = Some(FormError::Validation { fields });
                            }
                            Err(err) => {
                                // last-resort catch-all: log everything,
                                // surface nothing specific
                                tracing::error!(%err, "unexpected error during registration submission");
                                form_error = Some(FormError::Unknown);
                            }
                        }
                    } else {
                        form_error = Some(FormError::NonceInvalid);
                    }
                }
                attempted_post = Some(post);
            }
        }

        if let Some(data_id) = submitted_data_id {
            session.set_flag(CONFIRMATION_FLAG).await;
            return Ok(ViewModel::redirect(request.edit_target(&data_id)));
        }

        let payment = match &participant {
            Some(p) => self.payment.compute_info(p).await,
            None => PaymentInfo::default(),
        };

        if cancelled_time.is_some() {
            return Ok(ViewModel::Cancelled {
                cancel_success: cancel_succeeded,
                back_target,
            });
        }

        if is_cancellation || is_actual_cancellation {
            if let Some(p) = &participant {
                return Ok(ViewModel::CancelPrompt {
                    cancel_error: is_actual_cancellation && !cancel_succeeded,
                    back_target: request.edit_target(&p.data_id),
                    really_cancel_target: request.really_cancel_target(&p.data_id),
                });
            }
        }

        if is_confirmation && let Some(p) = &participant {
            return Ok(ViewModel::Confirmation {
                payment,
                edit_target: request.edit_target(&p.data_id),
                back_target,
            });
        }

        let data_id = participant.as_ref().map(|p| p.data_id.clone());
        let form = match self
            .form_engine
            .render(&self.config, participant.as_ref(), attempted_post.as_ref())
            .await
        {
            Ok(html) => html,
            Err(err) => {
                tracing::error!(%err, "failed to render registration form");
                return Ok(ViewModel::Error {
                    is_not_found: false,
                });
            }
        };

        let form_nonce = session.issue_nonce().await;
        let message = session
            .take_flag(PAYMENT_SUCCESS_RETURN_FLAG)
            .await
            .then_some(MessageKey::PaymentSuccessReturnMsg);

        Ok(ViewModel::Form {
            payment,
            editable: self.config.editable,
            cancelable: self.config.cancellable,
            back_target,
            cancel_target: data_id.as_ref().map(|id| request.cancel_target(id)),
            validate_target: request.validate_target(data_id.as_ref()),
            submit_target: request.submit_target(data_id.as_ref()),
            data_id,
            form_nonce,
            form,
            message,
            error: form_error,
        })
    }

    async fn validate_only(
        &self,
        participant: Option<&Participant>,
        post: &Map<String, Value>,
    ) -> Option<FormError> {
        match self.form_engine.validate(&self.config, participant, post).await {
            Ok(FormValidation::Valid(_)) => None,
            Ok(FormValidation::Invalid(fields)) => Some(FormError::Validation { fields }),
            Err(err) => {
                tracing::error!(%err, "form validation failed upstream");
                Some(FormError::Unknown)
            }
        }
    }

    /// Validates, then persists: update for an existing participant, create
    /// otherwise. Never reached without a consumed nonce.
    async fn try_submit(
        &self,
        participant: Option<&Participant>,
        post: &Map<String, Value>,
    ) -> Result<std::result::Result<DataId, Vec<FieldError>>> {
        match self.form_engine.validate(&self.config, participant, post).await? {
            FormValidation::Invalid(fields) => Ok(Err(fields)),
            FormValidation::Valid(data) => match participant {
                Some(p) => {
                    self.repo
                        .update(&self.settings.registration, &p.data_id, &data)
                        .await?;
                    Ok(Ok(p.data_id.clone()))
                }
                None => {
                    let data_id = self.repo.create(&self.settings.registration, &data).await?;
                    Ok(Ok(data_id))
                }
            },
        }
    }
}
