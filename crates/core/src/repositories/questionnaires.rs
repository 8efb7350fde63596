//! Questionnaire assignment and scoring on the per-side collections.
//!
//! A side bundle is found by the `Patient ID:` narrative of its patient stub, matched as a
//! whole identifier. An assignment is identified by the questionnaire's code label plus the
//! phase token `(<marker>)` in its value text, so the same questionnaire can be assigned once
//! per phase.

use crate::collection::Collection;
use crate::locator::{find_one, BundleQuery};
use crate::store::{DocumentStore, StoredBundle};
use crate::{PatientError, PatientResult};
use chrono::NaiveDate;
use fhir::builders::period_token;
use fhir::{
    Bundle, FhirResource, ObservationCode, Patient, Phase, QuestionnaireAssignmentData,
    QuestionnaireScoreData, Questionnaires, Resource, Side,
};
use prom_types::Uhid;
use std::sync::Arc;

/// What an assignment did to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentOutcome {
    /// No side bundle existed; a new one was inserted.
    Created,
    /// The observation was appended to the existing side bundle.
    Appended,
    /// The questionnaire was already assigned for this phase. Nothing was written.
    AlreadyAssigned,
}

/// One entry of a bulk assignment.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignmentRequest {
    pub uhid: Uhid,
    pub side: Side,
    pub assignment: QuestionnaireAssignmentData,
}

#[derive(Clone)]
pub struct QuestionnaireService {
    store: Arc<dyn DocumentStore>,
}

impl QuestionnaireService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Assign a questionnaire to a patient for one side and phase.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::InvalidInput`] if the name is not a known questionnaire label.
    pub fn assign(
        &self,
        uhid: &Uhid,
        side: Side,
        assignment: &QuestionnaireAssignmentData,
    ) -> PatientResult<AssignmentOutcome> {
        ensure_questionnaire(&assignment.name)?;
        let collection = Collection::for_side(side);

        let Some(mut stored) = self.side_bundle(collection, uhid)? else {
            let bundle = Questionnaires::new_bundle(uhid, std::slice::from_ref(assignment))?;
            let id = self.store.insert(collection, &bundle)?;
            tracing::info!(%uhid, %collection, bundle = %id, name = %assignment.name, "created questionnaire bundle");
            return Ok(AssignmentOutcome::Created);
        };

        let already_assigned = stored.bundle.resources().any(|resource| match resource {
            Resource::Observation(observation) => {
                Questionnaires::is_assignment(&observation, &assignment.name, assignment.phase)
            }
            _ => false,
        });
        if already_assigned {
            return Ok(AssignmentOutcome::AlreadyAssigned);
        }

        let patient_ref = patient_reference(&stored.bundle).ok_or_else(|| {
            PatientError::InvalidInput(format!(
                "questionnaire bundle {} has no patient reference",
                stored.id
            ))
        })?;
        stored
            .bundle
            .entry
            .push(Questionnaires::observation_entry(&patient_ref, assignment)?);
        self.store.replace(collection, &stored.id, &stored.bundle)?;
        tracing::info!(%uhid, %collection, bundle = %stored.id, name = %assignment.name, "appended questionnaire");
        Ok(AssignmentOutcome::Appended)
    }

    /// Assign several questionnaires, in order. Stops at the first error.
    pub fn assign_many(
        &self,
        requests: &[AssignmentRequest],
    ) -> PatientResult<Vec<AssignmentOutcome>> {
        requests
            .iter()
            .map(|request| self.assign(&request.uhid, request.side, &request.assignment))
            .collect()
    }

    /// Record scores against an assigned questionnaire.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::NotFound`] if the side bundle or the assignment is missing.
    pub fn record_score(
        &self,
        uhid: &Uhid,
        side: Side,
        score: &QuestionnaireScoreData,
    ) -> PatientResult<()> {
        let collection = Collection::for_side(side);
        let mut stored = self
            .side_bundle(collection, uhid)?
            .ok_or_else(|| PatientError::NotFound(format!("patient bundle for {uhid}")))?;

        let mut updated = false;
        for entry in &mut stored.bundle.entry {
            let Some(Resource::Observation(mut observation)) = entry.decode() else {
                continue;
            };
            let linked = observation
                .subject
                .as_ref()
                .and_then(|s| s.reference.as_deref())
                .is_some_and(|r| r.starts_with("urn:uuid:"));
            if linked && Questionnaires::is_assignment(&observation, &score.name, score.phase) {
                Questionnaires::apply_score(&mut observation, score);
                entry.replace_resource(&observation)?;
                updated = true;
                break;
            }
        }

        if !updated {
            return Err(PatientError::NotFound(format!(
                "observation {} ({}) for {uhid}",
                score.name, score.phase
            )));
        }

        self.store.replace(collection, &stored.id, &stored.bundle)?;
        tracing::info!(%uhid, %collection, name = %score.name, "recorded questionnaire score");
        Ok(())
    }

    /// Remove every questionnaire observation of `phase` from the side bundle.
    ///
    /// Returns how many observations were removed.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::NotFound`] if the side bundle is missing or nothing matched.
    pub fn delete_for_phase(&self, uhid: &Uhid, side: Side, phase: Phase) -> PatientResult<usize> {
        let collection = Collection::for_side(side);
        let mut stored = self
            .side_bundle(collection, uhid)?
            .ok_or_else(|| PatientError::NotFound(format!("patient {uhid}")))?;

        let token = period_token(phase);
        let before = stored.bundle.entry.len();
        stored.bundle.entry.retain(|entry| {
            !(entry.resource_type() == Some(fhir::Observation::RESOURCE_TYPE)
                && entry.narrative_div().is_some_and(|div| div.contains(&token)))
        });
        let deleted = before - stored.bundle.entry.len();

        if deleted == 0 {
            return Err(PatientError::NotFound(format!(
                "questionnaires for period {phase}"
            )));
        }

        self.store.replace(collection, &stored.id, &stored.bundle)?;
        tracing::info!(%uhid, %collection, %phase, deleted, "deleted questionnaires");
        Ok(deleted)
    }

    /// Reset every questionnaire of `phase` on one side to unscored, with its deadline moved
    /// to `today`.
    ///
    /// Returns how many observations were reset. Zero is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PatientError::NotFound`] if the side bundle is missing.
    pub fn reset_for_phase(
        &self,
        uhid: &Uhid,
        side: Side,
        phase: Phase,
        today: NaiveDate,
    ) -> PatientResult<usize> {
        let collection = Collection::for_side(side);
        let mut stored = self
            .side_bundle(collection, uhid)?
            .ok_or_else(|| PatientError::NotFound(format!("patient {uhid}")))?;

        let token = period_token(phase);
        let deadline = today.format("%Y-%m-%d").to_string();
        let mut reset = 0;
        for entry in &mut stored.bundle.entry {
            let Some(Resource::Observation(mut observation)) = entry.decode() else {
                continue;
            };
            if !observation
                .value_string
                .as_deref()
                .is_some_and(|v| v.contains(&token))
            {
                continue;
            }
            Questionnaires::reset(&mut observation, phase, &deadline);
            entry.replace_resource(&observation)?;
            reset += 1;
        }

        if reset > 0 {
            self.store.replace(collection, &stored.id, &stored.bundle)?;
        }
        tracing::info!(%uhid, %collection, %phase, reset, "reset questionnaires");
        Ok(reset)
    }

    fn side_bundle(
        &self,
        collection: Collection,
        uhid: &Uhid,
    ) -> PatientResult<Option<StoredBundle>> {
        find_one(
            self.store.as_ref(),
            collection,
            BundleQuery::PatientId(uhid.as_str()),
        )
    }
}

fn ensure_questionnaire(name: &str) -> PatientResult<()> {
    match ObservationCode::classify(name) {
        Some(ObservationCode::Prom(_)) => Ok(()),
        _ => Err(PatientError::InvalidInput(format!(
            "unknown questionnaire {name:?}"
        ))),
    }
}

/// `urn:uuid:<id>` of the bundle's patient stub, falling back to its `fullUrl`.
fn patient_reference(bundle: &Bundle) -> Option<String> {
    let entry = bundle
        .entry
        .iter()
        .find(|e| e.resource_type() == Some(Patient::RESOURCE_TYPE))?;
    entry
        .resource_id()
        .map(|id| format!("urn:uuid:{id}"))
        .or_else(|| entry.full_url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn uhid() -> Uhid {
        Uhid::parse("MH001").unwrap()
    }

    fn assignment(name: &str, phase: Phase) -> QuestionnaireAssignmentData {
        QuestionnaireAssignmentData {
            name: name.into(),
            phase,
            assigned_date: "2025-01-01".into(),
            deadline: "2025-01-15".into(),
            completed: false,
        }
    }

    fn service() -> (Arc<MemoryStore>, QuestionnaireService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), QuestionnaireService::new(store))
    }

    fn observations(store: &MemoryStore, side: Side) -> Vec<fhir::Observation> {
        let stored = store.scan(Collection::for_side(side)).unwrap();
        stored[0]
            .bundle
            .resources()
            .filter_map(|r| match r {
                Resource::Observation(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn assign_creates_then_appends_then_deduplicates() {
        let (store, service) = service();
        let oks = "Oxford Knee Score (OKS)";

        assert_eq!(
            service.assign(&uhid(), Side::Left, &assignment(oks, Phase::PreOp)).unwrap(),
            AssignmentOutcome::Created
        );
        assert_eq!(
            service.assign(&uhid(), Side::Left, &assignment(oks, Phase::SixWeeks)).unwrap(),
            AssignmentOutcome::Appended
        );
        assert_eq!(
            service.assign(&uhid(), Side::Left, &assignment(oks, Phase::PreOp)).unwrap(),
            AssignmentOutcome::AlreadyAssigned
        );

        assert_eq!(store.scan(Collection::MedicalLeft).unwrap().len(), 1);
        assert!(store.scan(Collection::MedicalRight).unwrap().is_empty());
        let observations = observations(&store, Side::Left);
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].subject, observations[1].subject);
    }

    #[test]
    fn prefix_uhid_gets_its_own_bundle() {
        let (store, service) = service();
        let oks = "Oxford Knee Score (OKS)";
        let mh10 = Uhid::parse("MH10").unwrap();
        let mh1 = Uhid::parse("MH1").unwrap();

        service.assign(&mh10, Side::Left, &assignment(oks, Phase::PreOp)).unwrap();
        assert_eq!(
            service.assign(&mh1, Side::Left, &assignment(oks, Phase::SixWeeks)).unwrap(),
            AssignmentOutcome::Created
        );
        assert_eq!(store.scan(Collection::MedicalLeft).unwrap().len(), 2);

        assert!(matches!(
            service.delete_for_phase(&mh1, Side::Left, Phase::PreOp),
            Err(PatientError::NotFound(_))
        ));
        assert_eq!(
            service.delete_for_phase(&mh10, Side::Left, Phase::PreOp).unwrap(),
            1
        );
    }

    #[test]
    fn assign_rejects_unknown_questionnaire() {
        let (_, service) = service();
        let err = service
            .assign(&uhid(), Side::Right, &assignment("Blood Group", Phase::PreOp))
            .unwrap_err();
        assert!(matches!(err, PatientError::InvalidInput(_)));
    }

    #[test]
    fn assign_many_reports_each_outcome() {
        let (_, service) = service();
        let request = |name: &str| AssignmentRequest {
            uhid: uhid(),
            side: Side::Right,
            assignment: assignment(name, Phase::ThreeMonths),
        };
        let outcomes = service
            .assign_many(&[
                request("Knee Society Score (KSS)"),
                request("Forgotten Joint Score (FJS)"),
                request("Knee Society Score (KSS)"),
            ])
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                AssignmentOutcome::Created,
                AssignmentOutcome::Appended,
                AssignmentOutcome::AlreadyAssigned
            ]
        );
    }

    #[test]
    fn record_score_completes_the_assignment() {
        let (store, service) = service();
        let oks = "Oxford Knee Score (OKS)";
        service
            .assign(&uhid(), Side::Left, &assignment(oks, Phase::SixWeeks))
            .unwrap();

        let score = QuestionnaireScoreData {
            name: oks.into(),
            phase: Phase::SixWeeks,
            scores: vec![30, 12],
            timestamp: "2025-02-01T10:00:00Z".into(),
            others: vec!["knee stiff".into()],
        };
        service.record_score(&uhid(), Side::Left, &score).unwrap();

        let observation = &observations(&store, Side::Left)[0];
        assert_eq!(
            observation.value_string.as_deref(),
            Some("Scores (6W): 30, 12 (Recorded at 2025-02-01T10:00:00Z)")
        );
        assert_eq!(observation.status.as_deref(), Some("final"));
        assert_eq!(observation.completion_status(), Some(true));
        assert_eq!(observation.note_texts(), vec!["knee stiff".to_string()]);
    }

    #[test]
    fn record_score_without_assignment_is_not_found() {
        let (_, service) = service();
        let score = QuestionnaireScoreData {
            name: "Oxford Knee Score (OKS)".into(),
            phase: Phase::OneYear,
            scores: vec![1],
            timestamp: "t".into(),
            others: Vec::new(),
        };
        assert!(matches!(
            service.record_score(&uhid(), Side::Left, &score),
            Err(PatientError::NotFound(_))
        ));

        service
            .assign(&uhid(), Side::Left, &assignment("Oxford Knee Score (OKS)", Phase::PreOp))
            .unwrap();
        assert!(matches!(
            service.record_score(&uhid(), Side::Left, &score),
            Err(PatientError::NotFound(_))
        ));
    }

    #[test]
    fn delete_for_phase_removes_only_that_phase() {
        let (store, service) = service();
        for (name, phase) in [
            ("Oxford Knee Score (OKS)", Phase::SixMonths),
            ("Knee Society Score (KSS)", Phase::SixMonths),
            ("Oxford Knee Score (OKS)", Phase::OneYear),
        ] {
            service
                .assign(&uhid(), Side::Right, &assignment(name, phase))
                .unwrap();
        }

        assert_eq!(
            service.delete_for_phase(&uhid(), Side::Right, Phase::SixMonths).unwrap(),
            2
        );
        let remaining = observations(&store, Side::Right);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].value_string.as_deref(), Some("Scores (1Y)"));

        assert!(matches!(
            service.delete_for_phase(&uhid(), Side::Right, Phase::SixMonths),
            Err(PatientError::NotFound(_))
        ));
    }

    #[test]
    fn reset_for_phase_clears_scores_of_that_phase() {
        let (store, service) = service();
        let oks = "Oxford Knee Score (OKS)";
        for phase in [Phase::SixWeeks, Phase::ThreeMonths] {
            service
                .assign(&uhid(), Side::Left, &assignment(oks, phase))
                .unwrap();
            service
                .record_score(
                    &uhid(),
                    Side::Left,
                    &QuestionnaireScoreData {
                        name: oks.into(),
                        phase,
                        scores: vec![20],
                        timestamp: "2025-02-01T10:00:00Z".into(),
                        others: Vec::new(),
                    },
                )
                .unwrap();
        }

        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(
            service.reset_for_phase(&uhid(), Side::Left, Phase::SixWeeks, today).unwrap(),
            1
        );

        let observations = observations(&store, Side::Left);
        assert_eq!(observations[0].completion_status(), Some(false));
        assert_eq!(observations[0].value_string.as_deref(), Some("Scores (6W)"));
        assert_eq!(observations[1].completion_status(), Some(true));
        assert_eq!(
            service.reset_for_phase(&uhid(), Side::Left, Phase::TwoYears, today).unwrap(),
            0
        );
    }
}
