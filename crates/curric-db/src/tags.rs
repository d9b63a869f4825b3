//! PostgreSQL implementation of [`TagStore`].

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tracing::warn;

use curric_core::{
    codes, Attributes, CurriculumType, Error, GradeProduct, LegacyTagMapping, ParentLink, Result,
    StoreTx, Tag, TagId, TagLocaleMapping, TagStore, TagType,
};

use crate::tags_tx::PgStoreTx;

pub(crate) const TAG_COLUMNS: &str = "id, type, name, curriculum_type, creator_id, creator_type, \
     access, tag_group, locale_available, country_id, publish, attributes, created_at, updated_at";

pub(crate) const LINK_COLUMNS: &str = "id, tag_id, tag_type, parent_tag_type, parent_tag_id, \
     \"order\", hidden, publish, created_at, updated_at";

const LOCALE_COLUMNS: &str =
    "id, tag_id, country_id, locale, name, tag_type, publish, created_at, updated_at";

const LEGACY_COLUMNS: &str =
    "id, tag_id, tag_id_type, legacy_id_type, legacy_id, created_at, updated_at";

/// Tag repository backed by a connection pool.
#[derive(Clone)]
pub struct PgTagStore {
    pool: Pool<Postgres>,
}

impl PgTagStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

/// Parse a text column into one of the string enums.
fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(column);
    raw.parse::<T>().map_err(|e| {
        warn!(
            subsystem = "database",
            component = "tags",
            column,
            error = %e,
            "Unmappable column value"
        );
        Error::internal(codes::TAG_MAPPER_ERROR)
    })
}

pub(crate) fn map_tag(r: &PgRow) -> Result<Tag> {
    let attributes: Json<Attributes> = r.get("attributes");
    Ok(Tag {
        id: r.get("id"),
        tag_type: parse_column(r, "type")?,
        name: r.get("name"),
        curriculum_type: parse_column(r, "curriculum_type")?,
        creator_id: r.get("creator_id"),
        creator_type: r.get("creator_type"),
        access: parse_column(r, "access")?,
        tag_group: parse_column(r, "tag_group")?,
        locale_available: r.get("locale_available"),
        country_id: r.get("country_id"),
        publish: r.get("publish"),
        attributes: attributes.0,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

pub(crate) fn map_link(r: &PgRow) -> Result<ParentLink> {
    Ok(ParentLink {
        id: r.get("id"),
        tag_id: r.get("tag_id"),
        tag_type: parse_column(r, "tag_type")?,
        parent_tag_type: r.get("parent_tag_type"),
        parent_tag_id: r.get("parent_tag_id"),
        order: r.get("order"),
        hidden: r.get("hidden"),
        publish: r.get("publish"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn map_locale(r: &PgRow) -> Result<TagLocaleMapping> {
    Ok(TagLocaleMapping {
        id: r.get("id"),
        tag_id: r.get("tag_id"),
        country_id: r.get("country_id"),
        locale: r.get("locale"),
        name: r.get("name"),
        tag_type: parse_column(r, "tag_type")?,
        publish: r.get("publish"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn map_legacy(r: &PgRow) -> LegacyTagMapping {
    LegacyTagMapping {
        id: r.get("id"),
        tag_id: r.get("tag_id"),
        tag_id_type: r.get("tag_id_type"),
        legacy_id_type: r.get("legacy_id_type"),
        legacy_id: r.get("legacy_id"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn map_grade_product(r: &PgRow) -> GradeProduct {
    GradeProduct {
        id: r.get("id"),
        folder_id: r.get("folder_id"),
        product_id: r.get("product_id"),
        grade: r.get("grade"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

#[async_trait]
impl TagStore for PgTagStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(Box::new(PgStoreTx::new(tx)))
    }

    async fn get_tag(&self, id: TagId) -> Result<Option<Tag>> {
        let row = sqlx::query(&format!("SELECT {} FROM tags WHERE id = $1", TAG_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(map_tag).transpose()
    }

    async fn get_tags(&self, ids: &[TagId]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tags WHERE id = ANY($1)",
            TAG_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(map_tag).collect()
    }

    async fn tags_in_range(&self, start: TagId, end: TagId) -> Result<Vec<Tag>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tags WHERE id BETWEEN $1 AND $2 ORDER BY id",
            TAG_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(map_tag).collect()
    }

    async fn tags_by_type(
        &self,
        curriculum_type: CurriculumType,
        tag_type: TagType,
        include_hidden: bool,
        start: i64,
        limit: i64,
    ) -> Result<Vec<Tag>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM tags
            WHERE curriculum_type = $1 AND type = $2 AND (publish OR $3)
            ORDER BY id
            LIMIT $4 OFFSET $5
            "#,
            TAG_COLUMNS
        ))
        .bind(curriculum_type.as_str())
        .bind(tag_type.as_str())
        .bind(include_hidden)
        .bind(limit)
        .bind(start)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(map_tag).collect()
    }

    async fn links_for_tag(&self, tag_id: TagId) -> Result<Vec<ParentLink>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM parent_tag_mapping WHERE tag_id = $1 AND publish ORDER BY id",
            LINK_COLUMNS
        ))
        .bind(tag_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(map_link).collect()
    }

    async fn order_rows(&self, parent_key: &str, tag_type: TagType) -> Result<Vec<ParentLink>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM parent_tag_mapping
            WHERE parent_tag_id = $1 AND tag_type = $2 AND publish
            ORDER BY "order", id
            "#,
            LINK_COLUMNS
        ))
        .bind(parent_key)
        .bind(tag_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(map_link).collect()
    }

    async fn link_to_parent(&self, tag_id: TagId, parent_key: &str) -> Result<Option<ParentLink>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM parent_tag_mapping
            WHERE tag_id = $1 AND parent_tag_id = $2 AND publish
            ORDER BY id
            LIMIT 1
            "#,
            LINK_COLUMNS
        ))
        .bind(tag_id)
        .bind(parent_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(map_link).transpose()
    }

    async fn locales_for_tag(&self, tag_id: TagId) -> Result<Vec<TagLocaleMapping>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tag_locale_mapping WHERE tag_id = $1 AND publish ORDER BY id",
            LOCALE_COLUMNS
        ))
        .bind(tag_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(map_locale).collect()
    }

    async fn locale_for(
        &self,
        tag_id: TagId,
        country_id: &str,
        locale: &str,
    ) -> Result<Option<TagLocaleMapping>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM tag_locale_mapping
            WHERE tag_id = $1 AND country_id = $2 AND lower(locale) = lower($3) AND publish
            LIMIT 1
            "#,
            LOCALE_COLUMNS
        ))
        .bind(tag_id)
        .bind(country_id)
        .bind(locale)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(map_locale).transpose()
    }

    async fn legacy_for_tags(&self, tag_ids: &[TagId]) -> Result<Vec<LegacyTagMapping>> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM legacy_tag_mapping WHERE tag_id = ANY($1) ORDER BY id",
            LEGACY_COLUMNS
        ))
        .bind(tag_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(map_legacy).collect())
    }

    async fn legacy_by_external(
        &self,
        legacy_id_type: &str,
        legacy_id: &str,
    ) -> Result<Vec<LegacyTagMapping>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM legacy_tag_mapping
            WHERE legacy_id_type = $1 AND legacy_id = $2
            ORDER BY id
            "#,
            LEGACY_COLUMNS
        ))
        .bind(legacy_id_type)
        .bind(legacy_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(map_legacy).collect())
    }

    async fn grade_products(&self, product_id: &str) -> Result<Vec<GradeProduct>> {
        let rows = sqlx::query(
            r#"
            SELECT id, folder_id, product_id, grade, created_at, updated_at
            FROM grade_product
            WHERE product_id = $1
            ORDER BY id
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(map_grade_product).collect())
    }
}
