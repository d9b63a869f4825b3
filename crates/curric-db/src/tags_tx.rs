//! Transactional writes for the tag tables.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};

use curric_core::{
    codes, Error, NewParentLink, NewTag, NewTagLocale, Result, StoreTx, TagId, TagPatch,
};

/// An open transaction on the pool. Dropped without commit, it rolls back.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

impl PgStoreTx {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn insert_tag(&mut self, tag: &NewTag) -> Result<TagId> {
        let row = sqlx::query(
            r#"
            INSERT INTO tags (
                type, name, curriculum_type, creator_id, creator_type, access,
                tag_group, country_id, attributes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(tag.tag_type.as_str())
        .bind(&tag.name)
        .bind(tag.curriculum_type.as_str())
        .bind(tag.creator_id)
        .bind(&tag.creator_type)
        .bind(tag.access.as_str())
        .bind(tag.tag_group.as_str())
        .bind(&tag.country_id)
        .bind(Json(&tag.attributes))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.get("id"))
    }

    async fn update_tag(&mut self, id: TagId, patch: &TagPatch) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tags
            SET name = COALESCE($2, name),
                attributes = COALESCE($3, attributes),
                publish = COALESCE($4, publish),
                locale_available = COALESCE($5, locale_available),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&patch.name)
        .bind(patch.attributes.as_ref().map(Json))
        .bind(patch.publish)
        .bind(patch.locale_available)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(codes::TAG_NOT_FOUND.to_string()));
        }
        Ok(())
    }

    async fn insert_link(&mut self, link: &NewParentLink) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO parent_tag_mapping (
                tag_id, tag_type, parent_tag_type, parent_tag_id, "order", hidden
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(link.tag_id)
        .bind(link.tag_type.as_str())
        .bind(&link.parent_tag_type)
        .bind(&link.parent_tag_id)
        .bind(link.order)
        .bind(link.hidden)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.get("id"))
    }

    async fn set_link_hidden(&mut self, link_id: i64, hidden: bool) -> Result<()> {
        sqlx::query(
            "UPDATE parent_tag_mapping SET hidden = $2, updated_at = now() WHERE id = $1",
        )
        .bind(link_id)
        .bind(hidden)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn set_link_order(&mut self, link_id: i64, order: i32) -> Result<()> {
        sqlx::query(
            r#"UPDATE parent_tag_mapping SET "order" = $2, updated_at = now() WHERE id = $1"#,
        )
        .bind(link_id)
        .bind(order)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn insert_locale(&mut self, locale: &NewTagLocale) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO tag_locale_mapping (tag_id, country_id, locale, name, tag_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(locale.tag_id)
        .bind(&locale.country_id)
        .bind(&locale.locale)
        .bind(&locale.name)
        .bind(locale.tag_type.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.get("id"))
    }

    async fn delete_locale(&mut self, locale_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE tag_locale_mapping SET publish = FALSE, updated_at = now() WHERE id = $1",
        )
        .bind(locale_id)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(Error::Database)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(Error::Database)
    }
}
