//! Form orchestrator: two input slots, guide/profile selection, error banner
//! and the submission lifecycle.
//!
//! [`ValidatorForm`] owns the [`FormState`] and is the only thing that
//! mutates it. Slow work is handed out as values: file reads as
//! [`PendingRead`] and submissions as [`Submission`]. Each carries the token
//! that was current when it was issued, and completions whose token has since
//! moved on are discarded.

use crate::catalog::ProfileCatalog;
use crate::client::{ValidationResult, ValidatorClient};
use crate::error::SubmitError;
use crate::issues::ValidationReport;
use crate::resource::{self, Document};
use crate::slot::{CompletedRead, InputSlot, PendingRead, SlotAction};
use crate::types::LineBase;

/// Which input slot an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotName {
    Resource,
    Profile,
}

#[derive(Debug, Clone)]
pub enum FormAction {
    Slot(SlotName, SlotAction),
    /// Select an implementation guide. Always clears the profile selection.
    SetImplementationGuide(Option<String>),
    SetProfileSelection(Option<String>),
    SetError(String),
    Reset,
}

/// Everything the form shows. Saved whole for back navigation.
#[derive(Debug, Clone)]
pub struct FormState {
    pub resource: InputSlot,
    pub profile: InputSlot,
    pub implementation_guide: Option<String>,
    pub profile_selection: Option<String>,
    /// Banner text; empty when there is nothing to show.
    pub error: String,
    pub results: Option<ValidationResult>,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            resource: InputSlot::new(Some(resource::validate)),
            profile: InputSlot::new(Some(resource::validate_optional)),
            implementation_guide: None,
            profile_selection: None,
            error: String::new(),
            results: None,
        }
    }
}

impl FormState {
    pub fn slot(&self, name: SlotName) -> &InputSlot {
        match name {
            SlotName::Resource => &self.resource,
            SlotName::Profile => &self.profile,
        }
    }

    fn slot_mut(&mut self, name: SlotName) -> &mut InputSlot {
        match name {
            SlotName::Resource => &mut self.resource,
            SlotName::Profile => &mut self.profile,
        }
    }

    /// Resource text is present and its validator accepted it.
    /// The profile slot never blocks submission.
    pub fn can_submit(&self) -> bool {
        self.resource.has_valid_text()
    }
}

/// Work captured by [`ValidatorForm::begin_submit`].
#[derive(Debug, Clone)]
pub struct Submission {
    token: u64,
    selected_profile: Option<String>,
    profile_text: String,
    resource_text: String,
}

impl Submission {
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Run the pipeline: upload the profile if one was given, then validate.
    pub async fn run(self, client: &ValidatorClient) -> SubmissionResult {
        let outcome = self.execute(client).await;
        SubmissionResult {
            token: self.token,
            outcome,
        }
    }

    async fn execute(&self, client: &ValidatorClient) -> Result<ValidationResult, SubmitError> {
        let mut profile_urls: Vec<String> = self.selected_profile.iter().cloned().collect();

        if !self.profile_text.is_empty() {
            let url = client
                .add_profile(&self.profile_text)
                .await
                .map_err(SubmitError::ProfileUpload)?;
            profile_urls.push(url);
        }

        // Profiles the resource declares for itself come after explicit ones.
        if let Ok(doc) = Document::parse(&self.resource_text) {
            profile_urls.extend(doc.meta_profiles());
        }

        client
            .validate_with(&profile_urls, &self.resource_text)
            .await
            .map_err(SubmitError::Validation)
    }
}

/// Completion of a [`Submission`], to be fed to [`ValidatorForm::finish_submit`].
#[derive(Debug)]
pub struct SubmissionResult {
    token: u64,
    outcome: Result<ValidationResult, SubmitError>,
}

/// What [`ValidatorForm::finish_submit`] did with a result.
#[derive(Debug)]
pub enum SubmitStatus {
    /// Results are attached to the form state.
    Completed,
    /// The error banner is set; entered text is untouched.
    Failed(SubmitError),
    /// A newer action superseded this submission.
    Discarded,
}

/// Owner of the form state.
#[derive(Debug, Default)]
pub struct ValidatorForm {
    state: FormState,
    submit_token: u64,
    in_flight: Option<u64>,
}

impl ValidatorForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate from a saved state. Returns reads to re-issue for slots that
    /// were saved mid-load.
    pub fn restore(&mut self, saved: FormState) -> Vec<(SlotName, PendingRead)> {
        let previous = std::mem::replace(&mut self.state, saved);
        self.state.resource.supersede(&previous.resource);
        self.state.profile.supersede(&previous.profile);
        self.invalidate_submission();

        let mut reads = Vec::new();
        for name in [SlotName::Resource, SlotName::Profile] {
            if let Some(read) = self.state.slot_mut(name).resume_read() {
                reads.push((name, read));
            }
        }
        reads
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    /// Copy of the current state for the navigation history.
    pub fn snapshot(&self) -> FormState {
        self.state.clone()
    }

    pub fn dispatch(&mut self, action: FormAction) -> Option<PendingRead> {
        match action {
            FormAction::Slot(name, action) => {
                self.invalidate_submission();
                self.state.slot_mut(name).dispatch(action)
            }
            FormAction::SetImplementationGuide(guide) => {
                self.invalidate_submission();
                self.state.implementation_guide = guide;
                self.state.profile_selection = None;
                None
            }
            FormAction::SetProfileSelection(profile) => {
                self.invalidate_submission();
                self.state.profile_selection = profile;
                None
            }
            FormAction::SetError(message) => {
                self.state.error = message;
                None
            }
            FormAction::Reset => {
                self.state.resource.reset();
                self.state.profile.reset();
                self.state.implementation_guide = None;
                self.state.profile_selection = None;
                self.state.error.clear();
                self.state.results = None;
                self.invalidate_submission();
                None
            }
        }
    }

    /// Edit a slot's text with that slot's own validator.
    pub fn change_text(&mut self, name: SlotName, content: impl Into<String>) {
        let validator = self.state.slot(name).validator();
        self.dispatch(FormAction::Slot(
            name,
            SlotAction::ChangeText {
                content: content.into(),
                validator,
            },
        ));
    }

    /// Apply a finished file read to its slot. Returns false if it was stale.
    pub fn complete_read(&mut self, name: SlotName, read: CompletedRead) -> bool {
        self.state.slot_mut(name).complete_read(read)
    }

    pub fn can_submit(&self) -> bool {
        self.state.can_submit()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Resource type of the current resource text, once it validates.
    pub fn detected_resource_type(&self) -> Option<String> {
        if !self.state.resource.has_valid_text() {
            return None;
        }
        Document::parse(self.state.resource.text())
            .ok()
            .map(|doc| doc.resource_type().to_string())
    }

    /// Banner shown under the resource input.
    pub fn detected_resource_banner(&self) -> Option<String> {
        self.detected_resource_type()
            .map(|t| format!("Detected resource of type: {}", t))
    }

    /// Profiles offered for the selected implementation guide.
    pub fn profile_options(&self, catalog: &ProfileCatalog) -> Vec<String> {
        self.state
            .implementation_guide
            .as_deref()
            .map(|guide| catalog.profile_options(guide))
            .unwrap_or_default()
    }

    /// Start a submission. When the resource can't be submitted the error
    /// banner is set and nothing is returned to run.
    pub fn begin_submit(&mut self) -> Result<Submission, SubmitError> {
        if !self.can_submit() {
            self.state.error = SubmitError::InvalidResource.to_string();
            return Err(SubmitError::InvalidResource);
        }

        if self.state.profile.is_loading() {
            tracing::warn!(
                file = self.state.profile.file_label(""),
                "profile file still loading, submitting without it"
            );
        }

        self.submit_token += 1;
        self.in_flight = Some(self.submit_token);
        tracing::info!(
            token = self.submit_token,
            guide = ?self.state.implementation_guide,
            profile = ?self.state.profile_selection,
            "submitting resource"
        );

        Ok(Submission {
            token: self.submit_token,
            selected_profile: self.state.profile_selection.clone(),
            profile_text: self.state.profile.text().to_string(),
            resource_text: self.state.resource.text().to_string(),
        })
    }

    /// Apply a finished submission.
    pub fn finish_submit(&mut self, result: SubmissionResult) -> SubmitStatus {
        if self.in_flight != Some(result.token) {
            tracing::warn!(
                token = result.token,
                current = self.submit_token,
                "discarding stale submission result"
            );
            return SubmitStatus::Discarded;
        }
        self.in_flight = None;

        match result.outcome {
            Ok(validation) => {
                tracing::info!(
                    token = result.token,
                    issues = validation.outcome.issue.len(),
                    profiles = %validation.profile_urls.join(","),
                    "validation finished"
                );
                self.state.error.clear();
                self.state.results = Some(validation);
                SubmitStatus::Completed
            }
            Err(err) => {
                tracing::info!(token = result.token, error = %err, "submission failed");
                self.state.error = err.to_string();
                SubmitStatus::Failed(err)
            }
        }
    }

    /// `begin_submit`, run and `finish_submit` in one go.
    pub async fn submit(&mut self, client: &ValidatorClient) -> SubmitStatus {
        match self.begin_submit() {
            Ok(submission) => {
                let result = submission.run(client).await;
                self.finish_submit(result)
            }
            Err(err) => SubmitStatus::Failed(err),
        }
    }

    pub fn dismiss_error(&mut self) {
        self.state.error.clear();
    }

    pub fn results(&self) -> Option<&ValidationResult> {
        self.state.results.as_ref()
    }

    /// Results page model for the last successful submission.
    pub fn report(&self, line_base: LineBase) -> Option<ValidationReport> {
        self.results()
            .map(|result| ValidationReport::new(result, line_base))
    }

    /// Page reload/unload: drop saved history and start over.
    pub fn reset_on_unload(&mut self, history: &mut FormHistory) {
        history.clear();
        self.dispatch(FormAction::Reset);
    }

    fn invalidate_submission(&mut self) {
        if self.in_flight.take().is_some() {
            tracing::debug!(token = self.submit_token, "in-flight submission superseded");
        }
    }
}

/// Saved form states, one per navigation point.
#[derive(Debug, Default)]
pub struct FormHistory {
    entries: Vec<FormState>,
}

impl FormHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save the form as it is when navigating away from it.
    pub fn push(&mut self, form: &ValidatorForm) {
        self.entries.push(form.snapshot());
    }

    /// Return to the most recent saved point, restoring it into `form`.
    pub fn back(&mut self, form: &mut ValidatorForm) -> Option<Vec<(SlotName, PendingRead)>> {
        let saved = self.entries.pop()?;
        Some(form.restore(saved))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GuideProfiles;
    use crate::slot::FileRef;
    use crate::types::{ContentKind, OperationOutcome};

    const PATIENT: &str = r#"{ "resourceType": "Patient" }"#;

    fn result_for(resource_text: &str) -> ValidationResult {
        ValidationResult {
            outcome: OperationOutcome {
                resource_type: "OperationOutcome".into(),
                issue: Vec::new(),
            },
            profile_urls: vec!["http://hl7.org/fhir/StructureDefinition/Patient".into()],
            resource_text: resource_text.into(),
            content_kind: ContentKind::Json,
        }
    }

    #[test]
    fn empty_form_cannot_submit() {
        let form = ValidatorForm::new();
        assert!(!form.can_submit());
        assert!(form.detected_resource_type().is_none());
    }

    #[test]
    fn invalid_resource_blocks_submission() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, r#"{ "trailingComma": true, }"#);
        assert!(!form.can_submit());

        let err = form.begin_submit().unwrap_err();
        assert!(matches!(err, SubmitError::InvalidResource));
        assert_eq!(form.state().error, "Resource is invalid");
        assert!(!form.is_submitting());
    }

    #[test]
    fn invalid_profile_does_not_block_submission() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        form.change_text(SlotName::Profile, "not a profile");
        assert!(form.state().profile.error().is_some());
        assert!(form.can_submit());
    }

    #[test]
    fn detected_resource_banner() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        assert_eq!(form.detected_resource_type().as_deref(), Some("Patient"));
        assert_eq!(
            form.detected_resource_banner().as_deref(),
            Some("Detected resource of type: Patient")
        );
    }

    #[test]
    fn changing_guide_clears_profile_selection() {
        let mut form = ValidatorForm::new();
        form.dispatch(FormAction::SetImplementationGuide(Some("hl7.fhir.us.core".into())));
        form.dispatch(FormAction::SetProfileSelection(Some("http://p".into())));
        assert_eq!(form.state().profile_selection.as_deref(), Some("http://p"));

        form.dispatch(FormAction::SetImplementationGuide(Some("hl7.fhir.uv.ips".into())));
        assert!(form.state().profile_selection.is_none());

        form.dispatch(FormAction::SetProfileSelection(Some("http://q".into())));
        form.dispatch(FormAction::SetImplementationGuide(None));
        assert!(form.state().profile_selection.is_none());
    }

    #[test]
    fn profile_options_follow_selected_guide() {
        let catalog = ProfileCatalog::new();
        catalog.insert(GuideProfiles {
            id: "hl7.fhir.us.core".into(),
            version: "3.1.0".into(),
            profiles: vec!["http://p1".into(), "http://p2".into()],
        });

        let mut form = ValidatorForm::new();
        assert!(form.profile_options(&catalog).is_empty());
        form.dispatch(FormAction::SetImplementationGuide(Some("hl7.fhir.us.core".into())));
        assert_eq!(form.profile_options(&catalog), vec!["http://p1", "http://p2"]);
    }

    #[test]
    fn set_and_dismiss_error_keeps_text() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        form.dispatch(FormAction::SetError("boom".into()));
        assert_eq!(form.state().error, "boom");

        form.dismiss_error();
        assert!(form.state().error.is_empty());
        assert_eq!(form.state().resource.text(), PATIENT);
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        form.dispatch(FormAction::SetImplementationGuide(Some("g".into())));
        form.dispatch(FormAction::SetError("boom".into()));
        form.dispatch(FormAction::Reset);

        let state = form.state();
        assert_eq!(state.resource.text(), "");
        assert!(state.resource.status().is_none());
        assert!(state.implementation_guide.is_none());
        assert!(state.error.is_empty());
        assert!(state.results.is_none());
    }

    #[test]
    fn successful_result_is_attached() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        form.dispatch(FormAction::SetError("old".into()));
        let submission = form.begin_submit().unwrap();
        assert!(form.is_submitting());

        let status = form.finish_submit(SubmissionResult {
            token: submission.token(),
            outcome: Ok(result_for(PATIENT)),
        });
        assert!(matches!(status, SubmitStatus::Completed));
        assert!(form.state().error.is_empty());
        assert!(form.results().is_some());
        assert!(form.report(LineBase::AsReported).is_some());
    }

    #[test]
    fn failure_sets_banner_and_keeps_input() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        let submission = form.begin_submit().unwrap();

        let status = form.finish_submit(SubmissionResult {
            token: submission.token(),
            outcome: Err(SubmitError::Validation(crate::error::ClientError::unparsable())),
        });
        assert!(matches!(status, SubmitStatus::Failed(_)));
        assert_eq!(
            form.state().error,
            "Failed to validate resource: The response from the server could not be parsed."
        );
        assert_eq!(form.state().resource.text(), PATIENT);
        assert!(form.can_submit());
    }

    #[test]
    fn older_submission_is_discarded() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        let first = form.begin_submit().unwrap();
        let second = form.begin_submit().unwrap();

        let stale = form.finish_submit(SubmissionResult {
            token: first.token(),
            outcome: Ok(result_for("first")),
        });
        assert!(matches!(stale, SubmitStatus::Discarded));
        assert!(form.results().is_none());

        let fresh = form.finish_submit(SubmissionResult {
            token: second.token(),
            outcome: Ok(result_for("second")),
        });
        assert!(matches!(fresh, SubmitStatus::Completed));
        assert_eq!(form.results().unwrap().resource_text, "second");
    }

    #[test]
    fn editing_resource_supersedes_submission() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        let submission = form.begin_submit().unwrap();
        form.change_text(SlotName::Resource, r#"{ "resourceType": "Observation" }"#);

        let status = form.finish_submit(SubmissionResult {
            token: submission.token(),
            outcome: Ok(result_for(PATIENT)),
        });
        assert!(matches!(status, SubmitStatus::Discarded));
    }

    fn assert_superseded_by(action: FormAction) {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        form.dispatch(FormAction::SetProfileSelection(Some("http://old".into())));
        let submission = form.begin_submit().unwrap();
        form.dispatch(action);

        let status = form.finish_submit(SubmissionResult {
            token: submission.token(),
            outcome: Ok(result_for(PATIENT)),
        });
        assert!(matches!(status, SubmitStatus::Discarded));
        assert!(form.results().is_none());
    }

    #[test]
    fn changing_guide_supersedes_submission() {
        assert_superseded_by(FormAction::SetImplementationGuide(Some("other.ig".into())));
    }

    #[test]
    fn changing_profile_selection_supersedes_submission() {
        assert_superseded_by(FormAction::SetProfileSelection(None));
    }

    #[test]
    fn profile_slot_actions_supersede_submission() {
        assert_superseded_by(FormAction::Slot(
            SlotName::Profile,
            SlotAction::UploadFile(FileRef::from_bytes("sd.json", "")),
        ));
        assert_superseded_by(FormAction::Slot(
            SlotName::Profile,
            SlotAction::ChangeText {
                content: "x".into(),
                validator: None,
            },
        ));
        assert_superseded_by(FormAction::Slot(SlotName::Profile, SlotAction::RemoveFile));
    }

    #[test]
    fn error_banner_does_not_supersede_submission() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        let submission = form.begin_submit().unwrap();
        form.dispatch(FormAction::SetError("notice".into()));

        let status = form.finish_submit(SubmissionResult {
            token: submission.token(),
            outcome: Ok(result_for(PATIENT)),
        });
        assert!(matches!(status, SubmitStatus::Completed));
    }

    #[test]
    fn loading_profile_is_left_out_of_submission() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        let _pending = form.dispatch(FormAction::Slot(
            SlotName::Profile,
            SlotAction::UploadFile(FileRef::from_bytes("sd.json", "{}")),
        ));
        assert!(form.state().profile.is_loading());

        let submission = form.begin_submit().unwrap();
        assert!(submission.profile_text.is_empty());
    }

    #[test]
    fn reset_supersedes_submission() {
        let mut form = ValidatorForm::new();
        form.change_text(SlotName::Resource, PATIENT);
        let submission = form.begin_submit().unwrap();
        form.dispatch(FormAction::Reset);

        let status = form.finish_submit(SubmissionResult {
            token: submission.token(),
            outcome: Ok(result_for(PATIENT)),
        });
        assert!(matches!(status, SubmitStatus::Discarded));
        assert!(form.results().is_none());
    }

    #[tokio::test]
    async fn reset_discards_pending_file_read() {
        let mut form = ValidatorForm::new();
        let pending = form
            .dispatch(FormAction::Slot(
                SlotName::Resource,
                SlotAction::UploadFile(FileRef::from_bytes("p.json", PATIENT)),
            ))
            .unwrap();
        form.dispatch(FormAction::Reset);

        assert!(!form.complete_read(SlotName::Resource, pending.run().await));
        assert_eq!(form.state().resource.text(), "");
    }

    #[tokio::test]
    async fn uploaded_resource_enables_submission() {
        let mut form = ValidatorForm::new();
        let pending = form
            .dispatch(FormAction::Slot(
                SlotName::Resource,
                SlotAction::UploadFile(FileRef::from_bytes("p.json", PATIENT)),
            ))
            .unwrap();
        assert!(!form.can_submit());

        assert!(form.complete_read(SlotName::Resource, pending.run().await));
        assert!(form.can_submit());
    }

    #[tokio::test]
    async fn history_back_restores_state_and_resumes_reads() {
        let mut form = ValidatorForm::new();
        let mut history = FormHistory::new();

        form.change_text(SlotName::Resource, PATIENT);
        form.dispatch(FormAction::SetImplementationGuide(Some("g".into())));
        let _pending = form.dispatch(FormAction::Slot(
            SlotName::Profile,
            SlotAction::UploadFile(FileRef::from_bytes("sd.json", "")),
        ));
        history.push(&form);
        form.dispatch(FormAction::Reset);

        let reads = history.back(&mut form).unwrap();
        assert_eq!(form.state().resource.text(), PATIENT);
        assert_eq!(form.state().implementation_guide.as_deref(), Some("g"));
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].0, SlotName::Profile);

        let (name, read) = reads.into_iter().next().unwrap();
        assert!(form.complete_read(name, read.run().await));
        assert!(!form.state().profile.is_loading());
        assert!(history.is_empty());
    }

    #[test]
    fn unload_clears_history_and_form() {
        let mut form = ValidatorForm::new();
        let mut history = FormHistory::new();
        form.change_text(SlotName::Resource, PATIENT);
        history.push(&form);

        form.reset_on_unload(&mut history);
        assert!(history.is_empty());
        assert_eq!(form.state().resource.text(), "");
        assert!(history.back(&mut form).is_none());
    }
}
