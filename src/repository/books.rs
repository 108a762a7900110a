//! Books repository: catalog queries and transactional book mutations

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{
            aggregate_availability, Book, BookAvailability, BookData, BookDetails, BookQuery, BookSummary,
            Category, Level,
        },
        copy::BookCopy,
    },
};

use super::{copies, paginate};

const SUMMARY_SELECT: &str = r#"
    SELECT b.id, b.title, b.authors, b.description, b.cover_path, b.created_at,
           lv.name AS level,
           ARRAY(
               SELECT c.name FROM book_categories bc
               JOIN categories c ON c.id = bc.category_id
               WHERE bc.book_id = b.id
               ORDER BY c.name
           ) AS categories,
           (SELECT COUNT(*) FROM copies cp WHERE cp.book_id = b.id) AS total_copies,
           (SELECT COUNT(*) FROM copies cp WHERE cp.book_id = b.id AND cp.status = 'available') AS available_count
    FROM books b
    LEFT JOIN levels lv ON lv.id = b.level_id
    WHERE TRUE"#;

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Search the catalog with availability counts
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<BookSummary>, i64)> {
        let (limit, offset) = paginate(query.page, query.per_page, 20);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books b WHERE TRUE");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(SUMMARY_SELECT);
        push_filters(&mut select, query);
        select
            .push(" ORDER BY b.title, b.id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let books = select
            .build_query_as::<BookSummary>()
            .fetch_all(&self.pool)
            .await?;

        Ok((books, total))
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Get a book with its level, categories, copies and availability
    pub async fn get_details(&self, id: Uuid) -> AppResult<BookDetails> {
        let book = self.get_by_id(id).await?;

        let level = match book.level_id {
            Some(level_id) => {
                sqlx::query_as::<_, Level>("SELECT id, name, description FROM levels WHERE id = $1")
                    .bind(level_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => None,
        };

        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT c.id, c.name, c.description
            FROM categories c
            JOIN book_categories bc ON bc.category_id = c.id
            WHERE bc.book_id = $1
            ORDER BY c.name
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let copies = sqlx::query_as::<_, BookCopy>(
            "SELECT * FROM copies WHERE book_id = $1 ORDER BY created_at, id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let availability = aggregate_availability(&copies)
            .remove(&id)
            .unwrap_or_else(|| BookAvailability {
                book_id: id,
                ..Default::default()
            });

        Ok(BookDetails {
            book,
            level,
            categories,
            copies,
            availability,
        })
    }

    /// Check that a book exists
    pub async fn exists(&self, id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Return the ids among `ids` that match no book
    pub async fn missing_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        let missing = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT requested.id
            FROM UNNEST($1::uuid[]) AS requested(id)
            WHERE NOT EXISTS (SELECT 1 FROM books b WHERE b.id = requested.id)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(missing)
    }

    /// Create a book with its category links and `copy_count` available copies
    pub async fn create(&self, data: &BookData, copy_count: u32) -> AppResult<(Book, Vec<BookCopy>)> {
        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, authors, description, isbn, publisher,
                               publication_year, edition, language, level_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&data.title)
        .bind(&data.authors)
        .bind(&data.description)
        .bind(&data.isbn)
        .bind(&data.publisher)
        .bind(data.publication_year)
        .bind(&data.edition)
        .bind(&data.language)
        .bind(data.level_id)
        .fetch_one(&mut *tx)
        .await?;

        link_categories(&mut tx, book.id, &data.categories).await?;

        let mut created = Vec::with_capacity(copy_count as usize);
        for _ in 0..copy_count {
            created.push(copies::insert_available(&mut tx, book.id).await?);
        }

        tx.commit().await?;

        Ok((book, created))
    }

    /// Update book fields and replace its category set
    pub async fn update(&self, id: Uuid, data: &BookData) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = $1, authors = $2, description = $3, isbn = $4, publisher = $5,
                publication_year = $6, edition = $7, language = $8, level_id = $9,
                updated_at = NOW()
            WHERE id = $10
            RETURNING *
            "#,
        )
        .bind(&data.title)
        .bind(&data.authors)
        .bind(&data.description)
        .bind(&data.isbn)
        .bind(&data.publisher)
        .bind(data.publication_year)
        .bind(&data.edition)
        .bind(&data.language)
        .bind(data.level_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        sqlx::query("DELETE FROM book_categories WHERE book_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        link_categories(&mut tx, id, &data.categories).await?;

        tx.commit().await?;

        Ok(book)
    }

    /// Delete a book, its copies and category links.
    ///
    /// Refused while any copy is out on an active or overdue loan. Past
    /// loans keep their row with `copy_id` cleared by the foreign key.
    pub async fn delete(&self, id: Uuid) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        // Lock the copies so no approval can claim one mid-delete
        sqlx::query("SELECT id FROM copies WHERE book_id = $1 FOR UPDATE")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let open_loans: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM loans l
            JOIN copies c ON c.id = l.copy_id
            WHERE c.book_id = $1 AND l.status IN ('active', 'overdue')
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if open_loans > 0 {
            return Err(AppError::Conflict(format!(
                "Cannot delete book: {} copy(ies) currently on loan",
                open_loans
            )));
        }

        sqlx::query("DELETE FROM book_categories WHERE book_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM copies WHERE book_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(book)
    }

    /// List all categories
    pub async fn categories(&self) -> AppResult<Vec<Category>> {
        let categories =
            sqlx::query_as::<_, Category>("SELECT id, name, description FROM categories ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(categories)
    }

    /// List all levels
    pub async fn levels(&self) -> AppResult<Vec<Level>> {
        let levels = sqlx::query_as::<_, Level>("SELECT id, name, description FROM levels ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(levels)
    }
}

async fn link_categories(conn: &mut PgConnection, book_id: Uuid, categories: &[Uuid]) -> AppResult<()> {
    if categories.is_empty() {
        return Ok(());
    }

    let known: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT id) FROM categories WHERE id = ANY($1)")
        .bind(categories)
        .fetch_one(&mut *conn)
        .await?;

    let mut distinct = categories.to_vec();
    distinct.sort();
    distinct.dedup();
    if known != distinct.len() as i64 {
        return Err(AppError::BadRequest("Unknown category id".to_string()));
    }

    sqlx::query(
        r#"
        INSERT INTO book_categories (book_id, category_id)
        SELECT $1, UNNEST($2::uuid[])
        ON CONFLICT (book_id, category_id) DO NOTHING
        "#,
    )
    .bind(book_id)
    .bind(&distinct)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
    if let Some(ref search) = query.search {
        let pattern = format!("%{}%", search.trim());
        builder
            .push(" AND (b.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM UNNEST(b.authors) AS a(name) WHERE a.name ILIKE ")
            .push_bind(pattern)
            .push("))");
    }
    if let Some(category_id) = query.category_id {
        builder
            .push(" AND EXISTS (SELECT 1 FROM book_categories bc WHERE bc.book_id = b.id AND bc.category_id = ")
            .push_bind(category_id)
            .push(")");
    }
    if let Some(level_id) = query.level_id {
        builder.push(" AND b.level_id = ").push_bind(level_id);
    }
    if query.available_only.unwrap_or(false) {
        builder.push(
            " AND EXISTS (SELECT 1 FROM copies cp WHERE cp.book_id = b.id AND cp.status = 'available')",
        );
    }
}
