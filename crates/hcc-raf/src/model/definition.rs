use super::loader::LoadError;
use super::rules::{self, InteractionRule};
use super::ModelName;
use crate::scoring::Sex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;

/// Arena index of a condition category, scoped to one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CcId(u16);

impl CcId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Condition categories known to a model, interned as small integer ids.
#[derive(Debug, Clone, Default)]
pub struct CategoryCatalog {
    labels: Vec<String>,
    index: HashMap<String, CcId>,
}

impl CategoryCatalog {
    /// Returns `None` once every `CcId` is taken.
    pub fn intern(&mut self, label: &str) -> Option<CcId> {
        if let Some(id) = self.index.get(label) {
            return Some(*id);
        }
        let id = CcId(u16::try_from(self.labels.len()).ok()?);
        self.labels.push(label.to_string());
        self.index.insert(label.to_string(), id);
        Some(id)
    }

    pub fn get(&self, label: &str) -> Option<CcId> {
        self.index.get(label).copied()
    }

    pub fn label(&self, id: CcId) -> &str {
        &self.labels[id.index()]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = CcId> + '_ {
        (0..=u16::MAX).take(self.labels.len()).map(CcId)
    }

    /// Orders categories numerically where labels are numeric (`8` before `19`).
    pub fn sort_key(&self, id: CcId) -> (usize, &str) {
        let label = self.label(id);
        (label.len(), label)
    }
}

/// Age/sex eligibility attached to a mapping row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingCondition {
    pub sex: Option<Sex>,
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
}

impl MappingCondition {
    pub fn admits(&self, sex: Sex, age: u32) -> bool {
        self.sex.map_or(true, |required| required == sex)
            && self.age_min.map_or(true, |min| age >= min)
            && self.age_max.map_or(true, |max| age <= max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingTarget {
    pub cc: CcId,
    pub condition: MappingCondition,
}

/// Dominance edges stored as a parent -> children adjacency list over arena ids.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    children: Vec<Vec<CcId>>,
}

impl Hierarchy {
    fn with_capacity(categories: usize) -> Self {
        Self {
            children: vec![Vec::new(); categories],
        }
    }

    fn add_edge(&mut self, parent: CcId, child: CcId) {
        let children = &mut self.children[parent.index()];
        if !children.contains(&child) {
            children.push(child);
        }
    }

    pub fn children_of(&self, parent: CcId) -> &[CcId] {
        self.children
            .get(parent.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.children.iter().map(Vec::len).sum()
    }

    /// Kahn's algorithm; returns a category on a cycle when one exists.
    fn find_cycle(&self) -> Option<CcId> {
        let mut indegree = vec![0usize; self.children.len()];
        for children in &self.children {
            for child in children {
                indegree[child.index()] += 1;
            }
        }

        let mut queue: VecDeque<usize> = indegree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(index, _)| index)
            .collect();
        let mut visited = 0;

        while let Some(index) = queue.pop_front() {
            visited += 1;
            for child in &self.children[index] {
                let degree = &mut indegree[child.index()];
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child.index());
                }
            }
        }

        if visited == self.children.len() {
            None
        } else {
            indegree
                .iter()
                .position(|degree| *degree > 0)
                .and_then(|index| u16::try_from(index).ok())
                .map(CcId)
        }
    }
}

/// Coefficient values keyed case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct CoefficientTable {
    values: HashMap<String, f64>,
}

impl CoefficientTable {
    pub fn insert(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_ascii_lowercase(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(&key.to_ascii_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Immutable, data-only description of one model version.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    name: ModelName,
    catalog: CategoryCatalog,
    mapping: HashMap<String, Vec<MappingTarget>>,
    hierarchy: Hierarchy,
    coefficients: CoefficientTable,
    chronic: BTreeSet<CcId>,
    rules: Vec<InteractionRule>,
    excluded: BTreeSet<CcId>,
    companions: Vec<(CcId, Vec<CcId>)>,
}

impl ModelDefinition {
    pub fn builder(name: ModelName) -> ModelDefinitionBuilder {
        ModelDefinitionBuilder::new(name)
    }

    pub fn name(&self) -> ModelName {
        self.name
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// Mapping targets for an already normalized diagnosis code.
    pub fn targets(&self, code: &str) -> Option<&[MappingTarget]> {
        self.mapping.get(code).map(Vec::as_slice)
    }

    pub fn mapped_code_count(&self) -> usize {
        self.mapping.len()
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn coefficients(&self) -> &CoefficientTable {
        &self.coefficients
    }

    pub fn is_chronic(&self, cc: CcId) -> bool {
        self.chronic.contains(&cc)
    }

    pub fn rules(&self) -> &[InteractionRule] {
        &self.rules
    }

    pub fn is_excluded(&self, cc: CcId) -> bool {
        self.excluded.contains(&cc)
    }

    /// Categories credited only when one of the listed companions is also present.
    pub fn companions(&self) -> &[(CcId, Vec<CcId>)] {
        &self.companions
    }
}

/// Incrementally assembles a [`ModelDefinition`] from table rows.
#[derive(Debug, Clone)]
pub struct ModelDefinitionBuilder {
    name: ModelName,
    catalog: CategoryCatalog,
    mapping: HashMap<String, Vec<MappingTarget>>,
    edges: Vec<(String, String)>,
    coefficients: CoefficientTable,
    chronic: Vec<String>,
    /// First category label that did not fit in the catalogue.
    overflow: Option<String>,
}

impl ModelDefinitionBuilder {
    pub fn new(name: ModelName) -> Self {
        Self {
            name,
            catalog: CategoryCatalog::default(),
            mapping: HashMap::new(),
            edges: Vec::new(),
            coefficients: CoefficientTable::default(),
            chronic: Vec::new(),
            overflow: None,
        }
    }

    pub fn map(self, code: &str, cc: &str) -> Self {
        self.map_when(code, cc, MappingCondition::default())
    }

    pub fn map_when(mut self, code: &str, cc: &str, condition: MappingCondition) -> Self {
        self.add_mapping(code, cc, condition);
        self
    }

    pub fn trump(mut self, parent: &str, child: &str) -> Self {
        self.add_edge(parent, child);
        self
    }

    pub fn coefficient(mut self, key: &str, value: f64) -> Self {
        self.add_coefficient(key, value);
        self
    }

    pub fn chronic(mut self, cc: &str) -> Self {
        self.add_chronic(cc);
        self
    }

    pub(crate) fn add_mapping(&mut self, code: &str, cc: &str, condition: MappingCondition) {
        let code = crate::scoring::normalize_code(code);
        if code.is_empty() {
            return;
        }
        let Some(cc) = self.catalog.intern(cc.trim()) else {
            self.overflow.get_or_insert_with(|| cc.trim().to_string());
            return;
        };
        let target = MappingTarget { cc, condition };
        let targets = self.mapping.entry(code).or_default();
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    pub(crate) fn add_edge(&mut self, parent: &str, child: &str) {
        self.edges
            .push((parent.trim().to_string(), child.trim().to_string()));
    }

    pub(crate) fn add_coefficient(&mut self, key: &str, value: f64) {
        self.coefficients.insert(key.trim(), value);
    }

    pub(crate) fn add_chronic(&mut self, cc: &str) {
        self.chronic.push(cc.trim().to_string());
    }

    pub fn build(self) -> Result<ModelDefinition, LoadError> {
        let Self {
            name,
            catalog,
            mapping,
            edges,
            coefficients,
            chronic,
            overflow,
        } = self;

        if let Some(label) = overflow {
            return Err(LoadError::TooManyCategories {
                model: name,
                limit: catalog.len(),
                label,
            });
        }

        let mut hierarchy = Hierarchy::with_capacity(catalog.len());
        for (parent, child) in &edges {
            match (catalog.get(parent), catalog.get(child)) {
                (Some(parent), Some(child)) => hierarchy.add_edge(parent, child),
                _ => debug!(
                    model = %name,
                    parent = parent.as_str(),
                    child = child.as_str(),
                    "dropping hierarchy edge outside the category catalogue"
                ),
            }
        }

        if let Some(cc) = hierarchy.find_cycle() {
            return Err(LoadError::Cycle {
                model: name,
                cc: catalog.label(cc).to_string(),
            });
        }

        let chronic = chronic
            .iter()
            .filter_map(|label| catalog.get(label))
            .collect();
        let excluded = rules::excluded_categories(name)
            .iter()
            .filter_map(|label| catalog.get(label))
            .collect();
        let companions = rules::companion_requirements(name)
            .iter()
            .filter_map(|spec| {
                let cc = catalog.get(spec.category)?;
                let partners = spec
                    .requires_any
                    .iter()
                    .filter_map(|label| catalog.get(label))
                    .collect();
                Some((cc, partners))
            })
            .collect();
        let rules = rules::resolve_rules(name, &catalog);

        Ok(ModelDefinition {
            name,
            catalog,
            mapping,
            hierarchy,
            coefficients,
            chronic,
            rules,
            excluded,
            companions,
        })
    }
}
