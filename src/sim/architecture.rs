//! Routing descriptors: which events flow between which models, which
//! exported variable feeds which import, and how nested architectures
//! re-export events across their boundary.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::error::ArchitectureError;

use super::event::EventType;
use super::model::ModelDescriptor;
use super::types::{ModelUri, VariableId};

/// One end of an event route: a member (atomic model or nested
/// architecture boundary) and an event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventEndpoint {
    pub member: ModelUri,
    pub event_type: EventType,
}

impl EventEndpoint {
    pub fn new(member: impl Into<String>, event_type: EventType) -> Self {
        Self {
            member: ModelUri::new(member),
            event_type,
        }
    }
}

/// An event a nested architecture emits across its boundary on behalf of
/// one of its members.
#[derive(Debug, Clone, PartialEq)]
pub struct Reexport {
    /// Type the boundary emits.
    pub event_type: EventType,
    /// Inner member and type that produce it.
    pub source: EventEndpoint,
}

/// An event a nested architecture accepts at its boundary and forwards.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryImport {
    pub event_type: EventType,
    pub sinks: Vec<EventEndpoint>,
}

/// An immutable, validated composition of atomic models and nested
/// architectures.
#[derive(Debug, Clone)]
pub struct Architecture {
    uri: ModelUri,
    models: Vec<ModelDescriptor>,
    children: Vec<Architecture>,
    routes: BTreeMap<EventEndpoint, Vec<EventEndpoint>>,
    bindings: BTreeMap<VariableId, Vec<VariableId>>,
    reexports: Vec<Reexport>,
    imports: Vec<BoundaryImport>,
}

/// Builder for [`Architecture`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ArchitectureBuilder {
    inner: Architecture,
}

impl ArchitectureBuilder {
    /// Adds an atomic member.
    pub fn model(mut self, descriptor: ModelDescriptor) -> Self {
        self.inner.models.push(descriptor);
        self
    }

    /// Adds a nested architecture as a member.
    pub fn child(mut self, child: Architecture) -> Self {
        self.inner.children.push(child);
        self
    }

    /// Routes events of `source` to each sink, in order.
    pub fn route(mut self, source: EventEndpoint, sinks: Vec<EventEndpoint>) -> Self {
        self.inner.routes.entry(source).or_default().extend(sinks);
        self
    }

    /// Routes every listed type from `from` to `to`, keeping the type.
    pub fn route_types(mut self, from: &str, to: &[&str], types: &[EventType]) -> Self {
        for &event_type in types {
            let sinks = to
                .iter()
                .map(|member| EventEndpoint::new(*member, event_type))
                .collect();
            self = self.route(EventEndpoint::new(from, event_type), sinks);
        }
        self
    }

    /// Binds the exported variable `export` to each import.
    pub fn bind(mut self, export: VariableId, imports: Vec<VariableId>) -> Self {
        self.inner.bindings.entry(export).or_default().extend(imports);
        self
    }

    /// Re-exports events of an inner member across this boundary.
    pub fn reexport(mut self, event_type: EventType, source: EventEndpoint) -> Self {
        self.inner.reexports.push(Reexport { event_type, source });
        self
    }

    /// Re-exports every listed type of `member` under the same type.
    pub fn reexport_types(mut self, member: &str, types: &[EventType]) -> Self {
        for &event_type in types {
            self = self.reexport(event_type, EventEndpoint::new(member, event_type));
        }
        self
    }

    /// Accepts `event_type` at this boundary and forwards it to `sinks`.
    pub fn import(mut self, event_type: EventType, sinks: Vec<EventEndpoint>) -> Self {
        self.inner.imports.push(BoundaryImport { event_type, sinks });
        self
    }

    /// Validates every endpoint against the member set.
    ///
    /// # Errors
    ///
    /// Returns the first [`ArchitectureError`] found.
    pub fn build(self) -> Result<Architecture, ArchitectureError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

/// The flattened view the kernel instantiates: every atomic model of the
/// tree, with routes and bindings resolved to atomic endpoints.
#[derive(Debug, Clone)]
pub struct FlatArchitecture {
    pub models: Vec<ModelDescriptor>,
    pub routes: HashMap<EventEndpoint, Vec<EventEndpoint>>,
    pub bindings: Vec<(VariableId, VariableId)>,
}

enum Member<'a> {
    Model(&'a ModelDescriptor),
    Child(&'a Architecture),
}

impl Architecture {
    /// Starts a new architecture named `uri`.
    pub fn builder(uri: impl Into<String>) -> ArchitectureBuilder {
        ArchitectureBuilder {
            inner: Architecture {
                uri: ModelUri::new(uri),
                models: Vec::new(),
                children: Vec::new(),
                routes: BTreeMap::new(),
                bindings: BTreeMap::new(),
                reexports: Vec::new(),
                imports: Vec::new(),
            },
        }
    }

    pub fn uri(&self) -> &ModelUri {
        &self.uri
    }

    /// Atomic members of this scope (not of nested architectures).
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn children(&self) -> &[Architecture] {
        &self.children
    }

    pub fn reexports(&self) -> &[Reexport] {
        &self.reexports
    }

    fn member(&self, uri: &ModelUri) -> Option<Member<'_>> {
        self.models
            .iter()
            .find(|m| &m.uri == uri)
            .map(Member::Model)
            .or_else(|| self.children.iter().find(|c| &c.uri == uri).map(Member::Child))
    }

    fn dangling(&self, role: &'static str, endpoint: &ModelUri) -> ArchitectureError {
        ArchitectureError::DanglingEndpoint {
            architecture: self.uri.to_string(),
            role,
            endpoint: endpoint.to_string(),
        }
    }

    fn check_source(&self, source: &EventEndpoint) -> Result<(), ArchitectureError> {
        match self.member(&source.member) {
            None => Err(self.dangling("event source", &source.member)),
            Some(Member::Model(m)) if !m.interface.emits.contains(&source.event_type) => {
                Err(ArchitectureError::UnknownEmission {
                    architecture: self.uri.to_string(),
                    model: m.uri.clone(),
                    event_type: source.event_type,
                })
            }
            Some(Member::Child(c))
                if !c.reexports.iter().any(|r| r.event_type == source.event_type) =>
            {
                Err(ArchitectureError::UnknownEmission {
                    architecture: self.uri.to_string(),
                    model: c.uri.clone(),
                    event_type: source.event_type,
                })
            }
            Some(_) => Ok(()),
        }
    }

    fn check_sink(&self, source_type: EventType, sink: &EventEndpoint) -> Result<(), ArchitectureError> {
        let unknown = |model: &ModelUri| ArchitectureError::UnknownReception {
            architecture: self.uri.to_string(),
            model: model.clone(),
            event_type: sink.event_type,
        };
        if !source_type.can_retag_as(sink.event_type) {
            return Err(ArchitectureError::IncompatibleRoute {
                architecture: self.uri.to_string(),
                from: source_type,
                to: sink.event_type,
            });
        }
        match self.member(&sink.member) {
            None => Err(self.dangling("event sink", &sink.member)),
            Some(Member::Model(m)) if !m.interface.accepts.contains(&sink.event_type) => {
                Err(unknown(&m.uri))
            }
            Some(Member::Child(c))
                if !c.imports.iter().any(|i| i.event_type == sink.event_type) =>
            {
                Err(unknown(&c.uri))
            }
            Some(_) => Ok(()),
        }
    }

    fn check_variable(&self, id: &VariableId, exported: bool) -> Result<(), ArchitectureError> {
        let role = if exported { "variable export" } else { "variable import" };
        match self.member(&id.model) {
            Some(Member::Model(m)) => {
                let declared = if exported {
                    &m.interface.exports
                } else {
                    &m.interface.imports
                };
                if declared.contains(&id.name) {
                    Ok(())
                } else {
                    Err(ArchitectureError::UndeclaredVariable {
                        architecture: self.uri.to_string(),
                        variable: id.clone(),
                    })
                }
            }
            _ => Err(self.dangling(role, &id.model)),
        }
    }

    fn validate(&self) -> Result<(), ArchitectureError> {
        let mut seen = BTreeSet::new();
        let member_uris = self
            .models
            .iter()
            .map(|m| &m.uri)
            .chain(self.children.iter().map(|c| &c.uri));
        for uri in member_uris {
            if !seen.insert(uri) {
                return Err(ArchitectureError::DuplicateMember {
                    architecture: self.uri.to_string(),
                    member: uri.to_string(),
                });
            }
        }

        for (source, sinks) in &self.routes {
            self.check_source(source)?;
            for sink in sinks {
                self.check_sink(source.event_type, sink)?;
            }
        }

        let mut bound_imports = BTreeSet::new();
        for (export, imports) in &self.bindings {
            self.check_variable(export, true)?;
            for import in imports {
                self.check_variable(import, false)?;
                if !bound_imports.insert(import) {
                    return Err(ArchitectureError::DuplicateExporter {
                        architecture: self.uri.to_string(),
                        import: import.clone(),
                    });
                }
            }
        }

        for reexport in &self.reexports {
            self.check_source(&reexport.source)?;
            if !reexport.source.event_type.can_retag_as(reexport.event_type) {
                return Err(ArchitectureError::IncompatibleRoute {
                    architecture: self.uri.to_string(),
                    from: reexport.source.event_type,
                    to: reexport.event_type,
                });
            }
        }

        for import in &self.imports {
            for sink in &import.sinks {
                self.check_sink(import.event_type, sink)?;
            }
        }

        Ok(())
    }

    /// Atomic endpoints producing `event_type` at `member` of this scope.
    fn resolve_sources(&self, member: &ModelUri, event_type: EventType) -> Vec<EventEndpoint> {
        match self.member(member) {
            Some(Member::Model(m)) => vec![EventEndpoint {
                member: m.uri.clone(),
                event_type,
            }],
            Some(Member::Child(c)) => c
                .reexports
                .iter()
                .filter(|r| r.event_type == event_type)
                .flat_map(|r| c.resolve_sources(&r.source.member, r.source.event_type))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Atomic endpoints receiving `event_type` delivered to `member` of this scope.
    fn resolve_sinks(&self, member: &ModelUri, event_type: EventType) -> Vec<EventEndpoint> {
        match self.member(member) {
            Some(Member::Model(m)) => vec![EventEndpoint {
                member: m.uri.clone(),
                event_type,
            }],
            Some(Member::Child(c)) => c
                .imports
                .iter()
                .filter(|i| i.event_type == event_type)
                .flat_map(|i| i.sinks.iter())
                .flat_map(|s| c.resolve_sinks(&s.member, s.event_type))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Resolves the tree into atomic models and atomic-to-atomic routes.
    ///
    /// A route whose source is a nested boundary expands to every inner
    /// model that boundary re-exports the type from; a route to a nested
    /// boundary expands to every inner sink of its import.
    ///
    /// # Errors
    ///
    /// Returns [`ArchitectureError::DuplicateExporter`] when bindings of
    /// different scopes feed the same import, and
    /// [`ArchitectureError::DuplicateMember`] when two atomic models
    /// anywhere in the tree share a URI.
    pub fn flatten(&self) -> Result<FlatArchitecture, ArchitectureError> {
        let mut flat = FlatArchitecture {
            models: Vec::new(),
            routes: HashMap::new(),
            bindings: Vec::new(),
        };
        self.flatten_into(&mut flat);

        let mut bound_imports = BTreeSet::new();
        for (_, import) in &flat.bindings {
            if !bound_imports.insert(import) {
                return Err(ArchitectureError::DuplicateExporter {
                    architecture: self.uri.to_string(),
                    import: import.clone(),
                });
            }
        }

        let mut seen = BTreeSet::new();
        for m in &flat.models {
            if !seen.insert(&m.uri) {
                return Err(ArchitectureError::DuplicateMember {
                    architecture: self.uri.to_string(),
                    member: m.uri.to_string(),
                });
            }
        }

        debug!(
            architecture = %self.uri,
            models = flat.models.len(),
            routes = flat.routes.len(),
            bindings = flat.bindings.len(),
            "architecture flattened"
        );
        Ok(flat)
    }

    fn flatten_into(&self, flat: &mut FlatArchitecture) {
        flat.models.extend(self.models.iter().cloned());
        for child in &self.children {
            child.flatten_into(flat);
        }

        for (source, sinks) in &self.routes {
            let atomic_sinks: Vec<EventEndpoint> = sinks
                .iter()
                .flat_map(|s| self.resolve_sinks(&s.member, s.event_type))
                .collect();
            for atomic_source in self.resolve_sources(&source.member, source.event_type) {
                let entry = flat.routes.entry(atomic_source).or_default();
                for sink in &atomic_sinks {
                    if !entry.contains(sink) {
                        entry.push(sink.clone());
                    }
                }
            }
        }

        for (export, imports) in &self.bindings {
            for import in imports {
                flat.bindings.push((export.clone(), import.clone()));
            }
        }
    }
}
