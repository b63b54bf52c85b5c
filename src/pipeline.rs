//! Ingestion pipeline: register, extract, key, link
//!
//! One call ingests one data source as a sequential batch. Records are
//! committed one at a time, so an aborted run leaves a valid graph whose
//! source stays `Pending` and can be resumed by registering the same bytes
//! again.

use crate::adapter::{CancellationToken, ExtractorRegistry, InputSet, RecordExtractor};
use crate::config::CuratorConfig;
use crate::curation::{LinkStats, Linker};
use crate::graph::{
    CurationGraph, CurationResult, DataSource, EntityDraft, Label, SourceState,
};
use crate::registry::{Registration, SourceRequest};
use crate::stitch::KeyPolicy;
use crate::storage::EntityFilter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One data source to ingest
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub name: String,
    pub format: String,
    pub input: InputSet,
    /// Layered over the extractor default and any configured policy
    pub policy: Option<KeyPolicy>,
    /// Digest (or prefix) the caller expects the inputs to have
    pub expected_digest: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl IngestRequest {
    pub fn new(name: impl Into<String>, format: impl Into<String>, input: InputSet) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            input,
            policy: None,
            expected_digest: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_expected_digest(mut self, digest: impl Into<String>) -> Self {
        self.expected_digest = Some(digest.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// How the registry treated the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Created,
    Resumed,
    AlreadyRegistered,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub outcome: IngestOutcome,
    pub source: DataSource,
    /// Entities created by this run (0 when re-running committed records)
    pub entities_created: u64,
    /// Records committed by this run
    pub records: u64,
    /// Records skipped for format errors
    pub rejected: u64,
    pub links: LinkStats,
    /// Stopped between records before the source was complete
    pub cancelled: bool,
}

impl IngestReport {
    fn skipped(source: DataSource) -> Self {
        Self {
            outcome: IngestOutcome::AlreadyRegistered,
            source,
            entities_created: 0,
            records: 0,
            rejected: 0,
            links: LinkStats::default(),
            cancelled: false,
        }
    }
}

/// Ingests data sources into one curation graph
#[derive(Debug, Clone)]
pub struct CurationPipeline {
    graph: Arc<CurationGraph>,
    extractors: ExtractorRegistry,
    config: CuratorConfig,
}

impl CurationPipeline {
    pub fn new(graph: Arc<CurationGraph>, config: CuratorConfig) -> Self {
        Self {
            extractors: ExtractorRegistry::standard(&config),
            graph,
            config,
        }
    }

    /// Replace the extractor registry
    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn graph(&self) -> &Arc<CurationGraph> {
        &self.graph
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    pub fn extractors(&self) -> &ExtractorRegistry {
        &self.extractors
    }

    pub fn ingest(&self, request: IngestRequest) -> CurationResult<IngestReport> {
        self.ingest_with(request, &CancellationToken::new())
    }

    /// Ingest, checking `cancel` between records
    pub fn ingest_with(
        &self,
        request: IngestRequest,
        cancel: &CancellationToken,
    ) -> CurationResult<IngestReport> {
        let extractor = self.extractors.get(&request.format)?;
        let inputs = extractor.required_inputs(&request.input)?;
        let registration = self.graph.registry().register(
            SourceRequest::new(&request.name, &request.format, &request.input, inputs)
                .with_expected_digest(request.expected_digest.clone())
                .with_metadata(request.metadata.clone()),
        )?;

        let (outcome, mut claim) = match registration {
            Registration::AlreadyRegistered(source) => return Ok(IngestReport::skipped(source)),
            Registration::Created(claim) => (IngestOutcome::Created, claim),
            Registration::Resumed(claim) => (IngestOutcome::Resumed, claim),
        };

        let policy = self.policy_for(extractor.as_ref(), request.policy.as_ref());
        let store = self.graph.store();
        let linker = Linker::new(&self.graph, self.config.link_topology);
        let kind = extractor.entity_kind();
        let source_id = claim.source().id.clone();
        let source_label = claim.source().label();

        let mut stream = extractor.extract(&request.input)?;
        let mut links = LinkStats::default();
        let mut entities_created = 0;
        let mut records = 0;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let Some(record) = stream.next() else {
                break;
            };
            let record = record?;

            if claim.source().properties.is_empty() {
                claim.source_mut().properties = record.field_names();
                store.update_source(claim.source())?;
            }

            let source_key = policy.source_key(|field| record.get(field));
            let keys = policy.extract_with(|field| record.get(field));
            let draft = EntityDraft::new(kind, source_id.clone(), stream.parsed())
                .with_source_key(source_key)
                .with_properties(record.into_properties())
                .with_label(Label::Entity)
                .with_label(Label::Data)
                .with_label(source_label.clone());

            let (entity, created) = store.find_or_create_entity(&draft)?;
            if created {
                entities_created += 1;
            }
            links.absorb(linker.link(entity, &keys)?);
            records += 1;
            debug!(entity = %entity, ordinal = draft.ordinal, keys = keys.len(), "record committed");
        }

        let committed = store
            .entity_ids(&EntityFilter::new().with_source(source_id))?
            .len() as u64;
        let source = claim.source_mut();
        source.instances = committed;
        if !cancelled {
            source.state = SourceState::Complete;
        }
        store.update_source(source)?;

        let short = source.id.short(self.config.digest_prefix_len).to_string();
        if cancelled {
            warn!(digest = %short, name = %source.name, committed, "ingestion cancelled; source left pending");
        } else {
            info!(
                digest = %short,
                name = %source.name,
                instances = committed,
                rejected = stream.rejected(),
                links = links.links_created,
                "data source ingested"
            );
        }

        Ok(IngestReport {
            outcome,
            source: claim.source().clone(),
            entities_created,
            records,
            rejected: stream.rejected(),
            links,
            cancelled,
        })
    }

    /// Extractor default, then the configured policy, then the caller's
    fn policy_for(&self, extractor: &dyn RecordExtractor, overrides: Option<&KeyPolicy>) -> KeyPolicy {
        let mut policy = extractor.default_policy();
        if let Some(configured) = self.config.policy_for(extractor.format()) {
            policy = policy.merge(configured);
        }
        if let Some(overrides) = overrides {
            policy = policy.merge(overrides);
        }
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::sdf::SDF;
    use crate::stitch::KeyKind;

    const MOLECULES: &str = "\
aspirin
  manual

  0  0  0  0  0  0  0  0  0  0999 V2000
M  END
> <NAME>
ASPIRIN

> <CAS>
50-78-2

$$$$
acetylsalicylic acid
  manual

  0  0  0  0  0  0  0  0  0  0999 V2000
M  END
> <NAME>
Acetylsalicylic Acid

> <CAS>
50-78-2

$$$$
";

    fn pipeline() -> CurationPipeline {
        let graph = Arc::new(CurationGraph::in_memory().unwrap());
        CurationPipeline::new(graph, CuratorConfig::default())
    }

    fn request() -> IngestRequest {
        IngestRequest::new("npc", SDF, InputSet::memory([("npc.sdf", MOLECULES.as_bytes().to_vec())]))
            .with_policy(
                KeyPolicy::new()
                    .add(KeyKind::Name, "NAME")
                    .add(KeyKind::Cas, "CAS"),
            )
    }

    #[test]
    fn ingest_creates_entities_and_links() {
        let pipeline = pipeline();
        let report = pipeline.ingest(request()).unwrap();
        assert_eq!(report.outcome, IngestOutcome::Created);
        assert_eq!(report.entities_created, 2);
        assert_eq!(report.source.instances, 2);
        assert_eq!(report.source.state, SourceState::Complete);
        assert_eq!(report.links.links_created, 1);
        assert!(report.source.properties.contains(&"CAS".to_string()));

        let snapshot = pipeline.graph().snapshot().unwrap();
        assert_eq!(snapshot.entities.len(), 2);
        assert!(snapshot
            .entities
            .values()
            .all(|e| e.has_label(&Label::Source("npc".into())) && e.has_label(&Label::Data)));
    }

    #[test]
    fn same_bytes_twice_create_nothing_new() {
        let pipeline = pipeline();
        pipeline.ingest(request()).unwrap();
        let again = pipeline.ingest(request()).unwrap();
        assert_eq!(again.outcome, IngestOutcome::AlreadyRegistered);
        assert_eq!(again.entities_created, 0);
        assert_eq!(pipeline.graph().sources().unwrap().len(), 1);
    }

    #[test]
    fn cancelled_run_stays_pending_and_resumes() {
        let pipeline = pipeline();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = pipeline.ingest_with(request(), &cancel).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.source.state, SourceState::Pending);
        assert_eq!(report.source.instances, 0);

        let resumed = pipeline.ingest(request()).unwrap();
        assert_eq!(resumed.outcome, IngestOutcome::Resumed);
        assert_eq!(resumed.source.instances, 2);
        assert_eq!(resumed.source.state, SourceState::Complete);
    }

    #[test]
    fn unknown_format_is_rejected_before_registration() {
        let pipeline = pipeline();
        let req = IngestRequest::new("x", "xlsx", InputSet::memory([("a", b"1".to_vec())]));
        assert!(pipeline.ingest(req).is_err());
        assert!(pipeline.graph().sources().unwrap().is_empty());
    }
}
