//! `$orderby` clauses

/// Sort direction for a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// An ordered list of sort keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    keys: Vec<(String, Direction)>,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            keys: vec![(field.into(), Direction::Asc)],
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            keys: vec![(field.into(), Direction::Desc)],
        }
    }

    /// Add a secondary ascending key
    pub fn then_asc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), Direction::Asc));
        self
    }

    /// Add a secondary descending key
    pub fn then_desc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), Direction::Desc));
        self
    }

    pub fn to_odata(&self) -> String {
        self.keys
            .iter()
            .map(|(field, dir)| match dir {
                Direction::Asc => field.clone(),
                Direction::Desc => format!("{} desc", field),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}
