//! Column updates of a single tag: name, attributes, visibility, locales.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use tracing::info;

use curric_core::{
    codes, defaults, locale_key, CompensationTask, Error, NewTagLocale, Result, Tag, TagGroup,
    TagId, TagName, TagPatch, TagType,
};

use crate::cache::keys;
use crate::engine::CurriculumEngine;
use crate::requests::{LocaleAction, TagLocaleUpdate, UpdateTag};

impl CurriculumEngine {
    /// Delete a tag's cached copies; country tags also flush country listings.
    async fn invalidate_tag(&self, tag: &Tag, extra: &[String]) {
        let mut cache_keys = vec![keys::tag(tag.id)];
        cache_keys.extend(extra.iter().cloned());
        self.reads.invalidate(&cache_keys).await;
        if tag.tag_type == TagType::Country {
            self.reads.invalidate_pattern(&keys::country_pattern()).await;
        }
    }

    /// Patch name, attributes, or visibility and mirror the change in the index.
    ///
    /// New attributes are merged over the stored document so keys the caller
    /// did not send survive. `hidden` unpublishes the row and marks the index
    /// document deleted.
    pub async fn update_tag(&self, req: UpdateTag) -> Result<Tag> {
        let start = Instant::now();
        let existing = self.existing_tag(req.id).await?;

        let attributes = req.attributes.map(|mut attributes| {
            attributes.merge_missing_from(&existing.attributes);
            attributes
        });
        let patch = TagPatch {
            name: req.name.clone(),
            attributes,
            publish: req.hidden.map(|hidden| !hidden),
            locale_available: None,
        };
        if patch.is_empty() {
            return Ok(existing);
        }

        let (names, previous_names) = match &req.name {
            Some(name) => (
                self.index_names(&existing, name).await?,
                self.index_names(&existing, &existing.name).await?,
            ),
            None => (Vec::new(), Vec::new()),
        };

        self.invalidate_tag(&existing, &[]).await;
        let mut sync = self.begin("updateTag").await?;
        let written = async {
            sync.tx().update_tag(existing.id, &patch).await?;
            self.index.update_tag(existing.id, req.hidden, &names).await?;
            sync.owe(CompensationTask::Restore {
                tag_id: existing.id,
                deleted: req.hidden.map(|_| !existing.publish),
                names: previous_names,
            });
            Ok::<(), Error>(())
        }
        .await;
        if let Err(e) = written {
            return Err(sync.abort(e).await);
        }
        sync.commit().await?;
        self.invalidate_tag(&existing, &[]).await;

        let mut updated = existing;
        updated.apply(&patch, Utc::now());
        info!(
            subsystem = "sync",
            op = "update_tag",
            tag_id = updated.id,
            renamed = req.name.is_some(),
            hidden = ?req.hidden,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tag updated"
        );
        Ok(updated)
    }

    /// Add or remove localized names of a tag.
    ///
    /// Existing mappings for a requested `locale:country` are always replaced.
    /// `locale_available` tracks whether any mapping remains, and the index
    /// receives the full name list.
    pub async fn update_tag_locale(&self, req: TagLocaleUpdate) -> Result<()> {
        let start = Instant::now();
        let tag = self.existing_tag(req.id).await?;
        let existing = self.store.locales_for_tag(tag.id).await?;

        let primary = TagName {
            value: tag.name.clone(),
            locale: defaults::DEFAULT_LOCALE.to_string(),
        };
        let mut localized: BTreeMap<String, TagName> = existing
            .iter()
            .map(|m| {
                (
                    m.locale_key(),
                    TagName {
                        value: m.name.clone(),
                        locale: m.locale.clone(),
                    },
                )
            })
            .collect();
        let previous = all_names(&primary, &localized);

        let cache_keys: Vec<String> = req
            .locales
            .iter()
            .map(|entry| keys::tag_locale(tag.id, &entry.country_id, &entry.locale))
            .collect();
        self.invalidate_tag(&tag, &cache_keys).await;

        let mut total = existing.len();
        let mut sync = self.begin("updateTagLocale").await?;
        let written = async {
            for entry in &req.locales {
                let key = locale_key(&entry.locale, &entry.country_id);
                for mapping in existing.iter().filter(|m| m.locale_key() == key) {
                    sync.tx().delete_locale(mapping.id).await?;
                    total = total.saturating_sub(1);
                }
                localized.remove(&key);
                if req.action == LocaleAction::Add {
                    sync.tx()
                        .insert_locale(&NewTagLocale {
                            tag_id: tag.id,
                            country_id: entry.country_id.clone(),
                            locale: entry.locale.clone(),
                            name: req.name.clone(),
                            tag_type: tag.tag_type,
                        })
                        .await?;
                    total += 1;
                    localized.insert(
                        key,
                        TagName {
                            value: req.name.clone(),
                            locale: entry.locale.clone(),
                        },
                    );
                }
            }

            let locale_available = total > 0;
            if locale_available != tag.locale_available {
                let patch = TagPatch {
                    locale_available: Some(locale_available),
                    ..Default::default()
                };
                sync.tx().update_tag(tag.id, &patch).await?;
            }

            self.index
                .update_tag(tag.id, None, &all_names(&primary, &localized))
                .await?;
            sync.owe(CompensationTask::Restore {
                tag_id: tag.id,
                deleted: None,
                names: previous.clone(),
            });
            Ok::<(), Error>(())
        }
        .await;
        if let Err(e) = written {
            return Err(sync.abort(e).await);
        }
        sync.commit().await?;
        self.invalidate_tag(&tag, &cache_keys).await;

        info!(
            subsystem = "sync",
            op = "update_tag_locale",
            tag_id = tag.id,
            action = ?req.action,
            result_count = req.locales.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Tag locales updated"
        );
        Ok(())
    }

    /// Soft-delete an identifier tag and mark its index document deleted.
    pub async fn remove_identifier_tag(&self, id: TagId) -> Result<()> {
        let tag = self.existing_tag(id).await?;
        if tag.tag_group != TagGroup::Identifier {
            return Err(Error::bad_request(codes::NOT_IDENTIFIER));
        }

        self.invalidate_tag(&tag, &[]).await;
        let patch = TagPatch {
            publish: Some(false),
            ..Default::default()
        };
        let mut sync = self.begin("removeIdentifierTag").await?;
        let written = async {
            sync.tx().update_tag(tag.id, &patch).await?;
            self.index.update_tag(tag.id, Some(true), &[]).await?;
            sync.owe(CompensationTask::Restore {
                tag_id: tag.id,
                deleted: Some(!tag.publish),
                names: Vec::new(),
            });
            Ok::<(), Error>(())
        }
        .await;
        if let Err(e) = written {
            return Err(sync.abort(e).await);
        }
        sync.commit().await?;
        self.invalidate_tag(&tag, &[]).await;

        info!(
            subsystem = "sync",
            op = "remove_identifier_tag",
            tag_id = tag.id,
            "Identifier tag removed"
        );
        Ok(())
    }
}

fn all_names(primary: &TagName, localized: &BTreeMap<String, TagName>) -> Vec<TagName> {
    let mut names = Vec::with_capacity(localized.len() + 1);
    names.push(primary.clone());
    names.extend(localized.values().cloned());
    names
}
