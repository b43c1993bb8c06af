use quarry_core::naming;

/// Pivot table description of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotDef {
    pub related: String,
    pub table: String,
    /// Pivot column pointing at the parent.
    pub foreign_pivot_key: String,
    /// Pivot column pointing at the related model.
    pub related_pivot_key: String,
    pub parent_key: String,
    pub related_key: String,
    /// Extra pivot columns to expose on loaded records.
    pub columns: Vec<String>,
    pub timestamps: bool,
}

impl PivotDef {
    /// Conventional pivot between `parent` and `related`, e.g. `role_user`.
    pub fn infer(parent: &str, parent_key: &str, related: &str) -> Self {
        Self {
            related: related.to_string(),
            table: naming::pivot_table(parent, related),
            foreign_pivot_key: naming::foreign_key(parent),
            related_pivot_key: naming::foreign_key(related),
            parent_key: parent_key.to_string(),
            related_key: "id".to_string(),
            columns: Vec::new(),
            timestamps: false,
        }
    }

    /// Every pivot column selected alongside related rows.
    pub fn selected_columns(&self) -> Vec<String> {
        let mut cols = vec![self.foreign_pivot_key.clone(), self.related_pivot_key.clone()];
        for col in &self.columns {
            if !cols.contains(col) {
                cols.push(col.clone());
            }
        }
        if self.timestamps {
            for col in ["created_at", "updated_at"] {
                if !cols.iter().any(|c| c == col) {
                    cols.push(col.to_string());
                }
            }
        }
        cols
    }
}

/// How two models relate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationDef {
    HasOne {
        related: String,
        foreign_key: String,
        local_key: String,
    },
    HasMany {
        related: String,
        foreign_key: String,
        local_key: String,
    },
    BelongsTo {
        related: String,
        foreign_key: String,
        owner_key: String,
    },
    BelongsToMany(PivotDef),
    MorphOne {
        related: String,
        type_column: String,
        id_column: String,
        local_key: String,
    },
    MorphMany {
        related: String,
        type_column: String,
        id_column: String,
        local_key: String,
    },
    MorphTo {
        type_column: String,
        id_column: String,
    },
}

impl RelationDef {
    pub fn has_one(related: &str, foreign_key: &str, local_key: &str) -> Self {
        RelationDef::HasOne {
            related: related.to_string(),
            foreign_key: foreign_key.to_string(),
            local_key: local_key.to_string(),
        }
    }

    pub fn has_many(related: &str, foreign_key: &str, local_key: &str) -> Self {
        RelationDef::HasMany {
            related: related.to_string(),
            foreign_key: foreign_key.to_string(),
            local_key: local_key.to_string(),
        }
    }

    pub fn belongs_to(related: &str, foreign_key: &str, owner_key: &str) -> Self {
        RelationDef::BelongsTo {
            related: related.to_string(),
            foreign_key: foreign_key.to_string(),
            owner_key: owner_key.to_string(),
        }
    }

    pub fn belongs_to_many(pivot: PivotDef) -> Self {
        RelationDef::BelongsToMany(pivot)
    }

    /// `morph` names the column pair: `{morph}_type` / `{morph}_id`.
    pub fn morph_one(related: &str, morph: &str, local_key: &str) -> Self {
        RelationDef::MorphOne {
            related: related.to_string(),
            type_column: format!("{morph}_type"),
            id_column: format!("{morph}_id"),
            local_key: local_key.to_string(),
        }
    }

    pub fn morph_many(related: &str, morph: &str, local_key: &str) -> Self {
        RelationDef::MorphMany {
            related: related.to_string(),
            type_column: format!("{morph}_type"),
            id_column: format!("{morph}_id"),
            local_key: local_key.to_string(),
        }
    }

    pub fn morph_to(morph: &str) -> Self {
        RelationDef::MorphTo {
            type_column: format!("{morph}_type"),
            id_column: format!("{morph}_id"),
        }
    }

    /// Expose extra pivot columns. No-op for other kinds.
    pub fn with_pivot<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let RelationDef::BelongsToMany(pivot) = &mut self {
            pivot.columns.extend(columns.into_iter().map(Into::into));
        }
        self
    }

    /// Maintain `created_at` / `updated_at` on pivot rows.
    pub fn with_pivot_timestamps(mut self) -> Self {
        if let RelationDef::BelongsToMany(pivot) = &mut self {
            pivot.timestamps = true;
        }
        self
    }

    /// Related model name; `None` for `MorphTo`, which is resolved per row.
    pub fn related(&self) -> Option<&str> {
        match self {
            RelationDef::HasOne { related, .. }
            | RelationDef::HasMany { related, .. }
            | RelationDef::BelongsTo { related, .. }
            | RelationDef::MorphOne { related, .. }
            | RelationDef::MorphMany { related, .. } => Some(related),
            RelationDef::BelongsToMany(pivot) => Some(&pivot.related),
            RelationDef::MorphTo { .. } => None,
        }
    }

    /// Whether the relation loads a list rather than a single record.
    pub fn is_many(&self) -> bool {
        matches!(
            self,
            RelationDef::HasMany { .. } | RelationDef::BelongsToMany(_) | RelationDef::MorphMany { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelationDef::HasOne { .. } => "has_one",
            RelationDef::HasMany { .. } => "has_many",
            RelationDef::BelongsTo { .. } => "belongs_to",
            RelationDef::BelongsToMany(_) => "belongs_to_many",
            RelationDef::MorphOne { .. } => "morph_one",
            RelationDef::MorphMany { .. } => "morph_many",
            RelationDef::MorphTo { .. } => "morph_to",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pivot_inference() {
        let pivot = PivotDef::infer("User", "id", "Role");
        assert_eq!(pivot.table, "role_user");
        assert_eq!(pivot.foreign_pivot_key, "user_id");
        assert_eq!(pivot.related_pivot_key, "role_id");
    }

    #[test]
    fn test_pivot_selected_columns() {
        let def = RelationDef::belongs_to_many(PivotDef::infer("User", "id", "Role"))
            .with_pivot(["expires_at"])
            .with_pivot_timestamps();
        let RelationDef::BelongsToMany(pivot) = def else {
            panic!("expected many-to-many");
        };
        assert_eq!(
            pivot.selected_columns(),
            vec!["user_id", "role_id", "expires_at", "created_at", "updated_at"]
        );
    }

    #[test]
    fn test_morph_columns() {
        let def = RelationDef::morph_many("Comment", "commentable", "id");
        assert!(def.is_many());
        assert!(matches!(
            def,
            RelationDef::MorphMany { ref type_column, .. } if type_column == "commentable_type"
        ));
    }
}
