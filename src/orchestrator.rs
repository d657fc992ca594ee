//! Composition of the three agents into the request-level pipeline.
//!
//! ```text
//! QueryRequest ──▶ QueryAgent::classify ──▶ RetrievalAgent::answer ──▶ QueryResponse
//!                                   ▲
//!                     PatientDirectory (optional context)
//! ```
//!
//! The orchestrator is constructed explicitly by the caller and shared by
//! `Arc`; it holds no per-request state.

use std::sync::Arc;

use chronic_kb_core::models::{
    MetricRecord, PatientContext, PatientSnapshot, QueryAnalysis, QueryRequest, QueryResponse,
    RecommendationRequest, RecommendationResponse,
};
use chronic_kb_core::{KbError, Result};

use crate::agents::{QueryAgent, RecommendationAgent, RetrievalAgent};
use crate::knowledge::KnowledgeStore;
use crate::llm::LanguageModel;
use crate::patients::PatientDirectory;

/// Metrics handed to the recommendation agent per request.
const RECOMMENDATION_METRICS: usize = 10;

pub struct Orchestrator {
    query_agent: QueryAgent,
    retrieval_agent: RetrievalAgent,
    recommendation_agent: RecommendationAgent,
    patients: Arc<dyn PatientDirectory>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<KnowledgeStore>,
        model: Arc<dyn LanguageModel>,
        patients: Arc<dyn PatientDirectory>,
    ) -> Self {
        Self {
            query_agent: QueryAgent::new(model.clone()),
            retrieval_agent: RetrievalAgent::new(store.clone(), model.clone()),
            recommendation_agent: RecommendationAgent::new(store, model),
            patients,
        }
    }

    pub async fn classify(&self, query: &str) -> QueryAnalysis {
        self.query_agent.classify(query).await
    }

    /// Classify then answer, folding in `patient` when given.
    pub async fn process_query(
        &self,
        request: &QueryRequest,
        patient: Option<&PatientSnapshot>,
    ) -> Result<QueryResponse> {
        let analysis = self.query_agent.classify(&request.query).await;
        let context = patient.map(PatientContext::from_snapshot);
        self.retrieval_agent
            .answer(
                &request.query,
                Some(&analysis),
                context.as_ref(),
                request.max_results,
            )
            .await
    }

    /// Like [`process_query`](Self::process_query), resolving
    /// `request.patient_id` through the patient directory.
    pub async fn answer_for_patient(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let patient = match request.patient_id.as_deref() {
            Some(id) => Some(self.lookup(id)?),
            None => None,
        };
        self.process_query(request, patient.as_ref()).await
    }

    pub async fn get_recommendations(
        &self,
        request: &RecommendationRequest,
        patient: Option<&PatientSnapshot>,
        metrics: &[MetricRecord],
    ) -> Result<RecommendationResponse> {
        self.recommendation_agent
            .recommend(request, patient, metrics)
            .await
    }

    /// Recommendations for a directory patient, with their recent metrics.
    pub async fn recommend_for_patient(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResponse> {
        let patient = self.lookup(&request.patient_id)?;
        let metrics = self
            .patients
            .recent_metrics(&patient.id, RECOMMENDATION_METRICS);
        self.get_recommendations(request, Some(&patient), &metrics)
            .await
    }

    fn lookup(&self, id: &str) -> Result<PatientSnapshot> {
        self.patients
            .patient(id)
            .ok_or_else(|| KbError::NotFound(format!("patient {}", id)))
    }
}
