// src/db/funnel_repo.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::store::{BoardQuery, FunnelStore, NewActivity, RangeQuery},
    models::{
        funnel::{Activity, Client, ClientLossRecord, ClientStatus, LossReason},
        stats::DailyCountRow,
    },
};
use async_trait::async_trait;

// O repositório do funil, responsável por todas as interações com as tabelas
// 'clients' e 'activities'.
#[derive(Clone)]
pub struct FunnelRepository {
    pool: PgPool,
}

impl FunnelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FunnelStore for FunnelRepository {
    async fn fetch_board_page(&self, query: &BoardQuery) -> Result<Vec<Client>, AppError> {
        let clients = sqlx::query_as::<_, Client>(
            r#"
            SELECT *
            FROM clients
            WHERE unit_id = ANY($1)
              AND status NOT IN ('enrolled', 'lost', 'attendance-completed')
              AND ($2::text IS NULL
                   OR name ILIKE '%' || $2 || '%'
                   OR phone_number ILIKE '%' || $2 || '%')
              AND (NOT $3
                   OR next_contact_date IS NULL
                   OR next_contact_date <= $4)
            ORDER BY created_at DESC
            OFFSET $5 LIMIT $6
            "#,
        )
        .bind(&query.unit_ids)
        .bind(query.search.as_deref())
        .bind(query.pending_only)
        .bind(query.pending_until)
        .bind(query.offset)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(clients)
    }

    async fn fetch_client_activities(&self, client_id: Uuid) -> Result<Vec<Activity>, AppError> {
        let activities = sqlx::query_as::<_, Activity>(
            r#"
            SELECT *
            FROM activities
            WHERE client_id = $1 AND active = true
            ORDER BY created_at DESC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    // 1. Clientes novos por dia de criação
    async fn new_clients_per_day(
        &self,
        range: &RangeQuery,
    ) -> Result<Vec<DailyCountRow>, AppError> {
        let rows = sqlx::query_as::<_, DailyCountRow>(
            r#"
            SELECT
                to_char(created_at, 'YYYY-MM-DD') AS day,
                'new_clients' AS category,
                COUNT(*) AS total
            FROM clients
            WHERE unit_id = ANY($1)
              AND created_at >= $2 AND created_at < $3
              AND ($4::text IS NULL OR lead_source = $4)
            GROUP BY 1
            ORDER BY 1 ASC
            "#,
        )
        .bind(&range.unit_ids)
        .bind(range.start_utc())
        .bind(range.end_utc())
        .bind(range.lead_source.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // 2. Atividades por dia de CRIAÇÃO (o filtro de origem vem do cliente dono)
    async fn activities_created_per_day(
        &self,
        range: &RangeQuery,
    ) -> Result<Vec<DailyCountRow>, AppError> {
        let rows = sqlx::query_as::<_, DailyCountRow>(
            r#"
            SELECT
                to_char(a.created_at, 'YYYY-MM-DD') AS day,
                a.activity_type AS category,
                COUNT(*) AS total
            FROM activities a
            JOIN clients c ON c.id = a.client_id
            WHERE c.unit_id = ANY($1)
              AND a.active = true
              AND a.created_at >= $2 AND a.created_at < $3
              AND ($4::text IS NULL OR c.lead_source = $4)
            GROUP BY 1, 2
            ORDER BY 1 ASC
            "#,
        )
        .bind(&range.unit_ids)
        .bind(range.start_utc())
        .bind(range.end_utc())
        .bind(range.lead_source.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // 3. Atividades por dia AGENDADO (nunca lê created_at para o balde)
    async fn activities_scheduled_per_day(
        &self,
        range: &RangeQuery,
    ) -> Result<Vec<DailyCountRow>, AppError> {
        let rows = sqlx::query_as::<_, DailyCountRow>(
            r#"
            SELECT
                to_char(a.scheduled_date, 'YYYY-MM-DD') AS day,
                a.activity_type AS category,
                COUNT(*) AS total
            FROM activities a
            JOIN clients c ON c.id = a.client_id
            WHERE c.unit_id = ANY($1)
              AND a.active = true
              AND a.scheduled_date IS NOT NULL
              AND a.scheduled_date >= $2 AND a.scheduled_date < $3
              AND ($4::text IS NULL OR c.lead_source = $4)
            GROUP BY 1, 2
            ORDER BY 1 ASC
            "#,
        )
        .bind(&range.unit_ids)
        .bind(range.start_utc())
        .bind(range.end_utc())
        .bind(range.lead_source.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    fn supports_aggregated_funnel(&self) -> bool {
        true
    }

    // Caminho pré-agregado: uma única consulta devolve as métricas finais.
    // Uma atividade de agendamento conta em três métricas de criação ao mesmo
    // tempo (tentativa implícita, contato efetivo implícito e agendamento),
    // por isso os ramos do UNION se sobrepõem de propósito.
    async fn aggregated_funnel_per_day(
        &self,
        range: &RangeQuery,
    ) -> Result<Vec<DailyCountRow>, AppError> {
        let rows = sqlx::query_as::<_, DailyCountRow>(
            r#"
            SELECT day, category, SUM(total)::bigint AS total FROM (
                SELECT to_char(created_at, 'YYYY-MM-DD') AS day,
                       'new_clients' AS category, COUNT(*) AS total
                FROM clients
                WHERE unit_id = ANY($1)
                  AND created_at >= $2 AND created_at < $3
                  AND ($4::text IS NULL OR lead_source = $4)
                GROUP BY 1

                UNION ALL
                SELECT to_char(a.created_at, 'YYYY-MM-DD'), 'contact_attempts', COUNT(*)
                FROM activities a JOIN clients c ON c.id = a.client_id
                WHERE c.unit_id = ANY($1) AND a.active = true
                  AND a.created_at >= $2 AND a.created_at < $3
                  AND ($4::text IS NULL OR c.lead_source = $4)
                  AND a.activity_type IN ('contact-attempt', 'effective-contact', 'scheduling')
                GROUP BY 1

                UNION ALL
                SELECT to_char(a.created_at, 'YYYY-MM-DD'), 'effective_contacts', COUNT(*)
                FROM activities a JOIN clients c ON c.id = a.client_id
                WHERE c.unit_id = ANY($1) AND a.active = true
                  AND a.created_at >= $2 AND a.created_at < $3
                  AND ($4::text IS NULL OR c.lead_source = $4)
                  AND a.activity_type IN ('effective-contact', 'scheduling')
                GROUP BY 1

                UNION ALL
                SELECT to_char(a.created_at, 'YYYY-MM-DD'), 'scheduled_visits', COUNT(*)
                FROM activities a JOIN clients c ON c.id = a.client_id
                WHERE c.unit_id = ANY($1) AND a.active = true
                  AND a.created_at >= $2 AND a.created_at < $3
                  AND ($4::text IS NULL OR c.lead_source = $4)
                  AND a.activity_type = 'scheduling'
                GROUP BY 1

                UNION ALL
                SELECT to_char(a.created_at, 'YYYY-MM-DD'), 'completed_visits', COUNT(*)
                FROM activities a JOIN clients c ON c.id = a.client_id
                WHERE c.unit_id = ANY($1) AND a.active = true
                  AND a.created_at >= $2 AND a.created_at < $3
                  AND ($4::text IS NULL OR c.lead_source = $4)
                  AND a.activity_type = 'attendance'
                GROUP BY 1

                UNION ALL
                SELECT to_char(a.created_at, 'YYYY-MM-DD'), 'enrollments', COUNT(*)
                FROM activities a JOIN clients c ON c.id = a.client_id
                WHERE c.unit_id = ANY($1) AND a.active = true
                  AND a.created_at >= $2 AND a.created_at < $3
                  AND ($4::text IS NULL OR c.lead_source = $4)
                  AND a.activity_type = 'enrollment'
                GROUP BY 1

                UNION ALL
                SELECT to_char(a.scheduled_date, 'YYYY-MM-DD'), 'awaiting_visits', COUNT(*)
                FROM activities a JOIN clients c ON c.id = a.client_id
                WHERE c.unit_id = ANY($1) AND a.active = true
                  AND a.scheduled_date IS NOT NULL
                  AND a.scheduled_date >= $2 AND a.scheduled_date < $3
                  AND ($4::text IS NULL OR c.lead_source = $4)
                  AND a.activity_type = 'scheduling'
                GROUP BY 1
            ) t
            GROUP BY 1, 2
            ORDER BY 1 ASC
            "#,
        )
        .bind(&range.unit_ids)
        .bind(range.start_utc())
        .bind(range.end_utc())
        .bind(range.lead_source.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn register_activity(&self, input: &NewActivity) -> Result<Activity, AppError> {
        // Transação: a atividade e a transição de status andam juntas
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE id = $1)",
        )
        .bind(input.client_id)
        .fetch_one(&mut *tx)
        .await?;

        if !exists {
            return Err(AppError::ClientNotFound);
        }

        let activity = sqlx::query_as::<_, Activity>(
            r#"
            INSERT INTO activities
                (id, client_id, activity_type, contact_type,
                 scheduled_date, next_contact_date, notes, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, true, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.client_id)
        .bind(input.activity_type.as_str())
        .bind(input.contact_type.as_str())
        .bind(input.scheduled_date)
        .bind(input.next_contact_date)
        .bind(input.notes.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE clients
            SET status = $2,
                scheduled_date = COALESCE($3, scheduled_date),
                next_contact_date = COALESCE($4, next_contact_date),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(input.client_id)
        .bind(input.activity_type.next_status().as_str())
        .bind(input.scheduled_date)
        .bind(input.next_contact_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(activity)
    }

    async fn deactivate_activity(&self, activity_id: Uuid) -> Result<Activity, AppError> {
        let activity = sqlx::query_as::<_, Activity>(
            "UPDATE activities SET active = false WHERE id = $1 RETURNING *",
        )
        .bind(activity_id)
        .fetch_optional(&self.pool)
        .await?;

        activity.ok_or(AppError::ActivityNotFound)
    }

    async fn list_loss_reasons(&self) -> Result<Vec<LossReason>, AppError> {
        let reasons =
            sqlx::query_as::<_, LossReason>("SELECT * FROM loss_reasons ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(reasons)
    }

    async fn register_loss(
        &self,
        client_id: Uuid,
        reason_ids: &[Uuid],
        observations: Option<&str>,
    ) -> Result<Vec<ClientLossRecord>, AppError> {
        let mut tx = self.pool.begin().await?;

        let previous_status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM clients WHERE id = $1",
        )
        .bind(client_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::ClientNotFound)?;

        let mut records = Vec::with_capacity(reason_ids.len());
        for reason_id in reason_ids {
            let record = sqlx::query_as::<_, ClientLossRecord>(
                r#"
                INSERT INTO client_loss_records
                    (id, client_id, loss_reason_id, previous_status,
                     total_reasons_at_loss, observations, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, now())
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(client_id)
            .bind(reason_id)
            .bind(&previous_status)
            .bind(reason_ids.len() as i32)
            .bind(observations)
            .fetch_one(&mut *tx)
            .await?;
            records.push(record);
        }

        sqlx::query("UPDATE clients SET status = $2, updated_at = now() WHERE id = $1")
            .bind(client_id)
            .bind(ClientStatus::Lost.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(records)
    }
}
