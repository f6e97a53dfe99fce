//! Per-parse register bookkeeping: used/defined registers, declared attributes and samplers,
//! literal constants and inferred constant arrays.

use std::collections::BTreeMap;

use tracing::debug;

use crate::types::{RegisterType, TextureType, Usage, WriteMask};

pub type RegisterKey = (RegisterType, u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterEntry {
    pub regtype: RegisterType,
    pub regnum: u32,
    pub usage: Option<Usage>,
    pub index: u32,
    pub writemask: WriteMask,
    /// Declaration flags (`ATTRIBUTE_CENTROID` and friends).
    pub misc: u32,
    /// Set once a destination operand targets the register.
    pub written: bool,
}

impl RegisterEntry {
    pub fn new(regtype: RegisterType, regnum: u32) -> Self {
        Self {
            regtype,
            regnum,
            usage: None,
            index: 0,
            writemask: WriteMask::FULL,
            misc: 0,
            written: false,
        }
    }
}

/// Attribute declared with the centroid interpolation modifier.
pub const ATTRIBUTE_CENTROID: u32 = 0x1;
/// Attribute declared with partial precision.
pub const ATTRIBUTE_PARTIAL_PRECISION: u32 = 0x2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    Float([f32; 4]),
    Int([i32; 4]),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantEntry {
    pub index: u32,
    pub value: ConstantValue,
}

impl ConstantEntry {
    pub fn regtype(&self) -> RegisterType {
        match self.value {
            ConstantValue::Float(_) => RegisterType::Const,
            ConstantValue::Int(_) => RegisterType::ConstInt,
            ConstantValue::Bool(_) => RegisterType::ConstBool,
        }
    }
}

/// A run of float constant registers treated as one array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableGroup {
    pub index: u32,
    pub count: u32,
    /// Some instruction addresses into the group relatively.
    pub used: bool,
    /// Backed by DEF literals instead of uniforms.
    pub literal: bool,
}

impl VariableGroup {
    pub fn contains(&self, regnum: u32) -> bool {
        regnum >= self.index && regnum - self.index < self.count
    }

    pub fn end(&self) -> u32 {
        self.index + self.count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerEntry {
    pub regnum: u32,
    pub texture_type: TextureType,
    /// Sampled by `texbem`/`texbeml`, which needs the bump-environment matrix.
    pub texbem: bool,
}

#[derive(Debug, Default)]
pub struct RegisterTracker {
    used: BTreeMap<RegisterKey, RegisterEntry>,
    defined: BTreeMap<RegisterKey, RegisterEntry>,
    attributes: BTreeMap<RegisterKey, RegisterEntry>,
    samplers: BTreeMap<u32, SamplerEntry>,
    constants: Vec<ConstantEntry>,
    /// Float4 constant-table ranges `(start, count)` with more than one register.
    uniform_arrays: Vec<(u32, u32)>,
    groups: Vec<VariableGroup>,
    groups_inferred: bool,
}

impl RegisterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a use of `regtype:regnum` and returns its entry.
    ///
    /// A repeated use returns the existing entry. `written` only moves from false to true, so
    /// callers reading a source can inspect whether any earlier instruction wrote it.
    pub fn mark_used(&mut self, regtype: RegisterType, regnum: u32, written: bool) -> &mut RegisterEntry {
        let entry = self
            .used
            .entry((regtype, regnum))
            .or_insert_with(|| RegisterEntry::new(regtype, regnum));
        if written {
            entry.written = true;
        }
        entry
    }

    pub fn mark_defined(&mut self, regtype: RegisterType, regnum: u32) -> &mut RegisterEntry {
        self.defined
            .entry((regtype, regnum))
            .or_insert_with(|| RegisterEntry::new(regtype, regnum))
    }

    pub fn is_used(&self, regtype: RegisterType, regnum: u32) -> bool {
        self.used.contains_key(&(regtype, regnum))
    }

    pub fn is_defined(&self, regtype: RegisterType, regnum: u32) -> bool {
        self.defined.contains_key(&(regtype, regnum))
    }

    pub fn used(&self) -> impl Iterator<Item = &RegisterEntry> {
        self.used.values()
    }

    pub fn used_entry(&self, regtype: RegisterType, regnum: u32) -> Option<&RegisterEntry> {
        self.used.get(&(regtype, regnum))
    }

    /// Declares an attribute or output. Returns false if the register was already declared.
    pub fn add_attribute(
        &mut self,
        regtype: RegisterType,
        regnum: u32,
        usage: Usage,
        index: u32,
        writemask: WriteMask,
        misc: u32,
    ) -> bool {
        if self.attributes.contains_key(&(regtype, regnum)) {
            return false;
        }
        let mut entry = RegisterEntry::new(regtype, regnum);
        entry.usage = Some(usage);
        entry.index = index;
        entry.writemask = writemask;
        entry.misc = misc;
        self.attributes.insert((regtype, regnum), entry);
        true
    }

    pub fn attribute(&self, regtype: RegisterType, regnum: u32) -> Option<&RegisterEntry> {
        self.attributes.get(&(regtype, regnum))
    }

    pub fn attributes(&self) -> impl Iterator<Item = &RegisterEntry> {
        self.attributes.values()
    }

    /// Declares a sampler. Returns false if the sampler was already declared.
    pub fn add_sampler(&mut self, regnum: u32, texture_type: TextureType) -> bool {
        if self.samplers.contains_key(&regnum) {
            return false;
        }
        self.samplers.insert(
            regnum,
            SamplerEntry {
                regnum,
                texture_type,
                texbem: false,
            },
        );
        true
    }

    pub fn sampler_mut(&mut self, regnum: u32) -> Option<&mut SamplerEntry> {
        self.samplers.get_mut(&regnum)
    }

    pub fn sampler(&self, regnum: u32) -> Option<&SamplerEntry> {
        self.samplers.get(&regnum)
    }

    pub fn samplers(&self) -> impl Iterator<Item = &SamplerEntry> {
        self.samplers.values()
    }

    /// Records a DEF/DEFI/DEFB literal, replacing an earlier literal for the same register.
    pub fn add_constant(&mut self, constant: ConstantEntry) {
        let regtype = constant.regtype();
        self.constants
            .retain(|c| !(c.regtype() == regtype && c.index == constant.index));
        self.constants.push(constant);
    }

    pub fn constants(&self) -> &[ConstantEntry] {
        &self.constants
    }

    pub fn constant(&self, regtype: RegisterType, index: u32) -> Option<&ConstantEntry> {
        self.constants
            .iter()
            .find(|c| c.regtype() == regtype && c.index == index)
    }

    /// Records a float4 constant-table range that later becomes a uniform array.
    pub fn add_uniform_array(&mut self, index: u32, count: u32) {
        if count > 1 {
            self.uniform_arrays.push((index, count));
        }
    }

    /// Builds the constant arrays once. Later calls return without changes.
    pub fn infer_array_groups(&mut self) {
        if self.groups_inferred {
            return;
        }
        self.groups_inferred = true;

        let mut groups: Vec<VariableGroup> = Vec::new();
        let mut arrays = self.uniform_arrays.clone();
        arrays.sort_unstable();
        for (index, count) in arrays {
            let candidate = VariableGroup {
                index,
                count,
                used: false,
                literal: false,
            };
            if !groups.iter().any(|g| overlaps(g, &candidate)) {
                groups.push(candidate);
            }
        }

        let mut floats: Vec<u32> = self
            .constants
            .iter()
            .filter(|c| matches!(c.value, ConstantValue::Float(_)))
            .map(|c| c.index)
            .collect();
        floats.sort_unstable();
        floats.dedup();

        let mut runs: Vec<(u32, u32)> = Vec::new();
        for index in floats {
            match runs.last_mut() {
                Some((start, count)) if *start + *count == index => *count += 1,
                _ => runs.push((index, 1)),
            }
        }
        for (index, count) in runs.into_iter().filter(|&(_, count)| count > 1) {
            let candidate = VariableGroup {
                index,
                count,
                used: false,
                literal: true,
            };
            if !groups.iter().any(|g| overlaps(g, &candidate)) {
                groups.push(candidate);
            }
        }

        groups.sort_by_key(|g| g.index);
        debug!(groups = groups.len(), "inferred constant arrays");
        self.groups = groups;
    }

    pub fn groups(&self) -> &[VariableGroup] {
        &self.groups
    }

    pub fn group_containing(&self, regnum: u32) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(regnum))
    }

    pub fn mark_group_used(&mut self, group: usize) {
        if let Some(g) = self.groups.get_mut(group) {
            g.used = true;
        }
    }

    /// Adds a uniform array around `regnum` filling the gap between its neighbouring groups,
    /// bounded by `[0, limit)`. Used when relative addressing hits registers no constant table
    /// describes.
    pub fn add_fallback_group(&mut self, regnum: u32, limit: u32) -> usize {
        if let Some(existing) = self.group_containing(regnum) {
            return existing;
        }
        let start = self
            .groups
            .iter()
            .filter(|g| g.end() <= regnum)
            .map(VariableGroup::end)
            .max()
            .unwrap_or(0);
        let end = self
            .groups
            .iter()
            .filter(|g| g.index > regnum)
            .map(|g| g.index)
            .min()
            .unwrap_or(limit.max(regnum + 1));
        let group = VariableGroup {
            index: start,
            count: end - start,
            used: false,
            literal: false,
        };
        // Appended so indices already stored in decoded operands stay valid.
        self.groups.push(group);
        self.groups.len() - 1
    }

    /// Float4 values of a literal group, in register order.
    pub fn literal_values(&self, group: &VariableGroup) -> Vec<[f32; 4]> {
        (group.index..group.end())
            .map(|i| match self.constant(RegisterType::Const, i).map(|c| c.value) {
                Some(ConstantValue::Float(v)) => v,
                _ => [0.0; 4],
            })
            .collect()
    }
}

fn overlaps(a: &VariableGroup, b: &VariableGroup) -> bool {
    a.index < b.end() && b.index < a.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float(index: u32) -> ConstantEntry {
        ConstantEntry {
            index,
            value: ConstantValue::Float([index as f32; 4]),
        }
    }

    #[test]
    fn repeated_use_keeps_written_history() {
        let mut tracker = RegisterTracker::new();
        assert!(tracker.mark_used(RegisterType::Temp, 0, true).written);
        let entry = tracker.mark_used(RegisterType::Temp, 0, false);
        assert!(entry.written);
        assert_eq!(entry.regnum, 0);
        assert!(!tracker.mark_used(RegisterType::Temp, 1, false).written);
        assert_eq!(tracker.used().count(), 2);
    }

    #[test]
    fn defined_is_separate_from_used() {
        let mut tracker = RegisterTracker::new();
        tracker.mark_defined(RegisterType::Input, 3);
        assert!(tracker.is_defined(RegisterType::Input, 3));
        assert!(!tracker.is_used(RegisterType::Input, 3));
    }

    #[test]
    fn infers_literal_runs_and_uniform_arrays() {
        let mut tracker = RegisterTracker::new();
        for i in [0, 1, 2, 5, 9, 10] {
            tracker.add_constant(float(i));
        }
        tracker.add_uniform_array(20, 8);
        tracker.add_uniform_array(30, 1);
        tracker.infer_array_groups();

        let groups = tracker.groups().to_vec();
        assert_eq!(
            groups,
            vec![
                VariableGroup { index: 0, count: 3, used: false, literal: true },
                VariableGroup { index: 9, count: 2, used: false, literal: true },
                VariableGroup { index: 20, count: 8, used: false, literal: false },
            ]
        );

        tracker.infer_array_groups();
        assert_eq!(tracker.groups(), &groups[..]);
        assert_eq!(tracker.group_containing(10), Some(1));
        assert_eq!(tracker.group_containing(5), None);
    }

    #[test]
    fn literal_runs_overlapping_uniform_arrays_are_dropped() {
        let mut tracker = RegisterTracker::new();
        tracker.add_constant(float(3));
        tracker.add_constant(float(4));
        tracker.add_uniform_array(4, 4);
        tracker.infer_array_groups();
        assert_eq!(tracker.groups().len(), 1);
        assert!(!tracker.groups()[0].literal);
    }

    #[test]
    fn fallback_group_fills_gap() {
        let mut tracker = RegisterTracker::new();
        tracker.add_uniform_array(10, 4);
        tracker.infer_array_groups();
        let g = tracker.add_fallback_group(20, 256);
        assert_eq!(tracker.groups()[g].index, 14);
        assert_eq!(tracker.groups()[g].count, 242);
        let g = tracker.add_fallback_group(3, 256);
        assert_eq!(g, 2);
        assert_eq!(tracker.groups()[g].index, 0);
        assert_eq!(tracker.groups()[g].count, 10);
        assert_eq!(tracker.group_containing(12), Some(0));
    }

    #[test]
    fn redefinition_replaces_constant() {
        let mut tracker = RegisterTracker::new();
        tracker.add_constant(float(0));
        tracker.add_constant(ConstantEntry {
            index: 0,
            value: ConstantValue::Float([7.0; 4]),
        });
        tracker.add_constant(ConstantEntry {
            index: 0,
            value: ConstantValue::Int([1; 4]),
        });
        assert_eq!(tracker.constants().len(), 2);
        assert_eq!(
            tracker.constant(RegisterType::Const, 0).map(|c| c.value),
            Some(ConstantValue::Float([7.0; 4]))
        );
    }
}
