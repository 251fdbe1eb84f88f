//! `SQLite`-backed graph of digest nodes, their summary edges and mentioned entities.

use std::collections::BTreeMap;
use std::str::FromStr;

use arbor_tree::{DigestTree, Fact, Level};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};

use crate::entity::extract_entities;
use crate::error::{IndexError, Result};

const MAX_CHILDREN: i64 = 3;
const MAX_ENTITIES: i64 = 5;
const MAX_RELATED: i64 = 3;

/// A persisted tree node, in storage (insertion) order.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: i64,
    pub level: Level,
    pub level_index: usize,
    pub text: String,
    /// Indices of the lower-level nodes this node summarizes.
    pub tree_position: Vec<usize>,
    pub confidence: f32,
}

/// Graph neighborhood of one document used for re-ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphContext {
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub entities: Vec<String>,
    pub related: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntity {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub mention_count: i64,
}

/// Counts produced by a single [`GraphStore::index_tree`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    pub documents: usize,
    pub summary_edges: usize,
    pub mentions: usize,
}

type DocumentRow = (i64, String, i64, String, String, f64);

#[derive(Debug, Clone)]
pub struct GraphStore {
    pool: SqlitePool,
}

impl GraphStore {
    /// Open (or create) the `SQLite` database and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database shared by the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn new(path: &str) -> Result<Self> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Delete every node, edge and entity.
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails; nothing is removed in that case.
    pub async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        clear(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replace the stored graph with `tree`.
    ///
    /// The previous graph is cleared and every node, entity and edge is written
    /// in one transaction, so readers see either the old graph or the new one.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Tree`] if the tree mappings are inconsistent, or a
    /// database error if any write fails.
    pub async fn index_tree(&self, tree: &DigestTree) -> Result<IndexReport> {
        tree.validate()?;

        let mut tx = self.pool.begin().await?;
        clear(&mut tx).await?;

        let mut report = IndexReport::default();
        for node in tree.iter_top_down() {
            let position =
                serde_json::to_string(tree.tree_position(node.level, node.level_index))?;
            let (doc_id,): (i64,) = sqlx::query_as(
                "INSERT INTO documents (level, level_index, text, tree_position, confidence, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(node.level.as_str())
            .bind(i64::try_from(node.level_index)?)
            .bind(&node.text)
            .bind(position)
            .bind(f64::from(node.confidence))
            .bind(node.created.to_rfc3339())
            .fetch_one(&mut *tx)
            .await?;
            report.documents += 1;

            if let Some(fact) = &node.fact {
                report.mentions += link_entities(&mut tx, doc_id, fact).await?;
            }
        }

        for (leaf, facts) in &tree.leaf_fact_mapping {
            for fact in facts {
                link_summary(&mut tx, (Level::Fact, *fact), (Level::Leaf, *leaf)).await?;
                report.summary_edges += 1;
            }
        }
        for (branch, leaves) in &tree.branch_leaf_mapping {
            for leaf in leaves {
                link_summary(&mut tx, (Level::Leaf, *leaf), (Level::Branch, *branch)).await?;
                report.summary_edges += 1;
            }
        }
        for branch in 0..tree.branches.len() {
            link_summary(&mut tx, (Level::Branch, branch), (Level::Root, 0)).await?;
            report.summary_edges += 1;
        }

        tx.commit().await?;

        tracing::info!(
            documents = report.documents,
            summary_edges = report.summary_edges,
            mentions = report.mentions,
            "indexed digest tree"
        );
        Ok(report)
    }

    /// All stored documents in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn documents(&self) -> Result<Vec<StoredDocument>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT id, level, level_index, text, tree_position, confidence \
             FROM documents ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_document).collect()
    }

    /// Look up a node by its `(level, level_index)` key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn document(&self, level: Level, level_index: usize) -> Result<Option<StoredDocument>> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT id, level, level_index, text, tree_position, confidence \
             FROM documents WHERE level = ? AND level_index = ?",
        )
        .bind(level.as_str())
        .bind(i64::try_from(level_index)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_document).transpose()
    }

    /// The node that summarizes `(level, level_index)`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn parent_of(&self, level: Level, level_index: usize) -> Result<Option<StoredDocument>> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT p.id, p.level, p.level_index, p.text, p.tree_position, p.confidence \
             FROM documents c \
             JOIN summarized_by s ON s.child_id = c.id \
             JOIN documents p ON p.id = s.parent_id \
             WHERE c.level = ? AND c.level_index = ? \
             LIMIT 1",
        )
        .bind(level.as_str())
        .bind(i64::try_from(level_index)?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_document).transpose()
    }

    /// Parent text, up to three child texts, up to five mentioned entity names
    /// and up to three entities co-occurring with those.
    ///
    /// # Errors
    ///
    /// Returns an error if any query fails.
    pub async fn context(&self, document_id: i64) -> Result<GraphContext> {
        let parent: Option<(String,)> = sqlx::query_as(
            "SELECT p.text FROM summarized_by s JOIN documents p ON p.id = s.parent_id \
             WHERE s.child_id = ? LIMIT 1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        let children: Vec<(String,)> = sqlx::query_as(
            "SELECT c.text FROM summarized_by s JOIN documents c ON c.id = s.child_id \
             WHERE s.parent_id = ? ORDER BY c.level_index ASC LIMIT ?",
        )
        .bind(document_id)
        .bind(MAX_CHILDREN)
        .fetch_all(&self.pool)
        .await?;

        let entities: Vec<(String,)> = sqlx::query_as(
            "SELECT e.name FROM mentions m JOIN entities e ON e.id = m.entity_id \
             WHERE m.document_id = ? ORDER BY m.rowid ASC LIMIT ?",
        )
        .bind(document_id)
        .bind(MAX_ENTITIES)
        .fetch_all(&self.pool)
        .await?;

        let related: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT e.name FROM mentions m \
             JOIN co_occurs c ON c.entity_a = m.entity_id OR c.entity_b = m.entity_id \
             JOIN entities e ON e.id = CASE WHEN c.entity_a = m.entity_id THEN c.entity_b ELSE c.entity_a END \
             WHERE m.document_id = ? ORDER BY e.name ASC LIMIT ?",
        )
        .bind(document_id)
        .bind(MAX_RELATED)
        .fetch_all(&self.pool)
        .await?;

        Ok(GraphContext {
            parent: parent.map(|r| r.0),
            children: children.into_iter().map(|r| r.0).collect(),
            entities: entities.into_iter().map(|r| r.0).collect(),
            related: related.into_iter().map(|r| r.0).collect(),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn entity(&self, id: &str) -> Result<Option<StoredEntity>> {
        let row: Option<(String, String, String, i64)> = sqlx::query_as(
            "SELECT id, name, kind, mention_count FROM entities WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, name, kind, mention_count)| StoredEntity {
            id,
            name,
            kind,
            mention_count,
        }))
    }

    /// Co-occurrence count between two entities, in either order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn co_occurrence(&self, a: &str, b: &str) -> Result<Option<i64>> {
        let (lo, hi) = ordered(a, b);
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT count FROM co_occurs WHERE entity_a = ? AND entity_b = ?")
                .bind(lo)
                .bind(hi)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    /// Number of distinct co-occurrence edges.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn co_occurrence_edges(&self) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM co_occurs")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Stored node count for every level, zero when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn level_counts(&self) -> Result<BTreeMap<Level, usize>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT level, COUNT(*) FROM documents GROUP BY level")
                .fetch_all(&self.pool)
                .await?;

        let mut counts: BTreeMap<Level, usize> = Level::TOP_DOWN.iter().map(|l| (*l, 0)).collect();
        for (level, n) in rows {
            counts.insert(parse_level(&level)?, usize::try_from(n)?);
        }
        Ok(counts)
    }
}

async fn clear(conn: &mut SqliteConnection) -> Result<()> {
    for table in ["co_occurs", "mentions", "summarized_by", "entities", "documents"] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Upsert the fact's entities, link them to the document and bump pairwise
/// co-occurrence counts. Returns the number of mentions written.
async fn link_entities(conn: &mut SqliteConnection, doc_id: i64, fact: &Fact) -> Result<usize> {
    let entities = extract_entities(fact);

    for entity in &entities {
        sqlx::query(
            "INSERT INTO entities (id, name, kind, mention_count) VALUES (?, ?, ?, 1) \
             ON CONFLICT(id) DO UPDATE SET mention_count = mention_count + 1",
        )
        .bind(&entity.id)
        .bind(&entity.name)
        .bind(entity.kind.as_str())
        .execute(&mut *conn)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO mentions (document_id, entity_id) VALUES (?, ?)")
            .bind(doc_id)
            .bind(&entity.id)
            .execute(&mut *conn)
            .await?;
    }

    for (i, a) in entities.iter().enumerate() {
        for b in &entities[i + 1..] {
            if a.id == b.id {
                continue;
            }
            let (lo, hi) = ordered(&a.id, &b.id);
            sqlx::query(
                "INSERT INTO co_occurs (entity_a, entity_b, count) VALUES (?, ?, 1) \
                 ON CONFLICT(entity_a, entity_b) DO UPDATE SET count = count + 1",
            )
            .bind(lo)
            .bind(hi)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(entities.len())
}

/// Insert a `SUMMARIZED_BY` edge, resolving both ends by `(level, level_index)`.
async fn link_summary(
    conn: &mut SqliteConnection,
    child: (Level, usize),
    parent: (Level, usize),
) -> Result<()> {
    let result = sqlx::query(
        "INSERT INTO summarized_by (child_id, parent_id) \
         SELECT c.id, p.id FROM documents c, documents p \
         WHERE c.level = ? AND c.level_index = ? AND p.level = ? AND p.level_index = ?",
    )
    .bind(child.0.as_str())
    .bind(i64::try_from(child.1)?)
    .bind(parent.0.as_str())
    .bind(i64::try_from(parent.1)?)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(IndexError::Corrupt(format!(
            "cannot link {} #{} to {} #{}",
            child.0, child.1, parent.0, parent.1
        )));
    }
    Ok(())
}

fn ordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

fn parse_level(s: &str) -> Result<Level> {
    s.parse().map_err(IndexError::Corrupt)
}

#[allow(clippy::cast_possible_truncation)]
fn into_document(row: DocumentRow) -> Result<StoredDocument> {
    let (id, level, level_index, text, tree_position, confidence) = row;
    Ok(StoredDocument {
        id,
        level: parse_level(&level)?,
        level_index: usize::try_from(level_index)?,
        text,
        tree_position: serde_json::from_str(&tree_position)?,
        confidence: confidence as f32,
    })
}
