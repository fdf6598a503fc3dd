use crate::error::{MpmError, MpmResult};

/// What a group selects: particles, grid nodes, or either.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GroupKind {
    Particles,
    Nodes,
    All,
}

#[derive(Clone, Debug)]
pub struct Group {
    pub name: String,
    pub kind: GroupKind,
    pub bit: u32,
}

/// Registry of mask-bit groups. Bit 0 is the implicit `all` group carried by
/// every particle and node.
pub struct Groups {
    groups: Vec<Group>,
}

impl Groups {
    pub fn new() -> Self {
        Self {
            groups: vec![Group {
                name: "all".to_string(),
                kind: GroupKind::All,
                bit: 1,
            }],
        }
    }

    pub fn create(&mut self, name: &str, kind: GroupKind) -> MpmResult<u32> {
        if self.groups.iter().any(|g| g.name == name) {
            return Err(MpmError::Config(format!("group {:?} already exists", name)));
        }
        if self.groups.len() >= 32 {
            return Err(MpmError::Config("too many groups (32 max)".to_string()));
        }
        let bit = 1u32 << self.groups.len();
        self.groups.push(Group {
            name: name.to_string(),
            kind,
            bit,
        });
        Ok(bit)
    }

    pub fn find(&self, name: &str) -> MpmResult<&Group> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| MpmError::Config(format!("unknown group {:?}", name)))
    }
}

impl Default for Groups {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_group_exists_with_bit_one() {
        let groups = Groups::new();
        let g = groups.find("all").unwrap();
        assert_eq!(g.bit, 1);
        assert_eq!(g.kind, GroupKind::All);
    }

    #[test]
    fn created_groups_get_distinct_bits() {
        let mut groups = Groups::new();
        let a = groups.create("top", GroupKind::Nodes).unwrap();
        let b = groups.create("bottom", GroupKind::Particles).unwrap();
        assert_ne!(a, b);
        assert!(groups.create("top", GroupKind::Nodes).is_err());
        assert!(groups.find("missing").is_err());
    }
}
