use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::queries;
use crate::models::{
    ConversationState, Customer, Gender, NewBooking, PendingAccount, ProfileDraft,
    SelectedService, ServiceRequest, Session, VehicleOwner, VehicleSpec,
};
use crate::services::interactions::{record_interaction, MASKED_SECRET};
use crate::services::{ai, catalog, matcher, registry, scheduling};
use crate::state::AppState;

pub const GREETING: &str = "¡Hola! 👋 **Soy tu asistente para la reserva de servicios automotrices.** 🚗 ¿Cómo te puedo ayudar hoy? Por favor, proporcióname tu correo electrónico. 📧";
pub const INVALID_EMAIL: &str = "❌ **Por favor, proporciona un correo electrónico válido.**";
pub const NEW_CUSTOMER: &str = "**¡Encantado de conocerte!** 😊 Parece que eres un cliente nuevo. Por favor, dime tu nombre completo y apellido.";
pub const NO_VEHICLE: &str = "**No tienes un vehículo registrado.** 🚗 Por favor, registra tu vehículo primero. ¿Cuál es la marca de tu vehículo?";
pub const EMPTY_ANSWER: &str = "❌ **No recibí ninguna respuesta.** Por favor, inténtalo de nuevo.";
pub const INVALID_PHONE: &str = "❌ **El número de teléfono debe tener 9 dígitos.** Por favor, proporciona un número de teléfono válido.";
pub const ASK_ADDRESS: &str = "**Excelente.** 🏡 ¿Cuál es la dirección de tu domicilio?";
pub const ASK_COUNTRY: &str = "**Genial.** 🌍 ¿De qué país eres?";
pub const ASK_BIRTH_DATE: &str = "**Perfecto.** 🎂 ¿Cuál es tu fecha de nacimiento? (formato: AAAA-MM-DD)";
pub const INVALID_BIRTH_DATE: &str = "❌ **Formato de fecha incorrecto.** Por favor, proporciona tu fecha de nacimiento en el formato AAAA-MM-DD.";
pub const ASK_GENDER: &str = "Gracias. 🙏 ¿Cuál es tu género? (F para Femenino, M para Masculino, Otro)";
pub const INVALID_GENDER: &str = "❌ **Por favor, elige una opción válida:** F para Femenino, M para Masculino, Otro.";
pub const ASK_BRAND: &str = "Gracias. 🚗 **¿Cuál es la marca de tu vehículo?**";
pub const ASK_MODEL: &str = "**Ok, ahora dime.** 🚗 **¿Cuál es el modelo de tu vehículo?**";
pub const ASK_YEAR: &str = "**Está bien.** 🗓️ **¿Cuál es el año de tu vehículo?**";
pub const INVALID_YEAR: &str = "❌ **Por favor, proporciona un año válido.**";
pub const FUTURE_YEAR: &str = "❌ **El año del vehículo no puede ser en el futuro.** Por favor, proporciona un año válido.";
pub const ASK_PASSWORD: &str = "🔒 **Por favor, proporciona una contraseña para tu cuenta.**";
pub const CONFIRM_PASSWORD: &str = "🔒 **Por favor, confirma tu contraseña.**";
pub const PASSWORD_MISMATCH: &str = "❌ **Las contraseñas no coinciden.** Por favor, proporciona una contraseña para tu cuenta.";
pub const USER_ERROR: &str = "❌ **Hubo un error al registrar tu información.** Por favor, intenta de nuevo.";
pub const VEHICLE_ERROR: &str = "❌ **Hubo un error al registrar tu vehículo.** Por favor, intenta de nuevo.";
pub const SERVICE_UNAVAILABLE: &str = "❌ **El servicio que has solicitado no está disponible.** Por favor, elige otro servicio.";
pub const NO_SERVICE_SELECTED: &str = "❌ **Aún no has elegido un servicio.** Cuéntame qué servicio deseas reservar o qué problema tiene tu auto.";
pub const ASK_DATE: &str = "📅 **Por favor, proporciona la fecha para tu reserva (AAAA-MM-DD).**";
pub const OTHER_SERVICE: &str = "🛠️ **¿Cuál es el otro servicio que deseas reservar?**";
pub const ASK_QUERY: &str = "🔍 **¿Cuál es tu consulta específica? Detállame qué quieres saber 💡**";
pub const SERVICE_MENU: &str = "❌ **No entiendo tu respuesta. Por favor, elige una opción: reservar el servicio, reservar otro servicio, o 🔍 CONSULTA ESPECIFICA.**";
pub const INVALID_DATE: &str = "❌ **Formato de fecha incorrecto.** Por favor, proporciona la fecha para tu reserva (AAAA-MM-DD).";
pub const NO_SLOTS_ON_DATE: &str = "❌ **Lo siento, no hay slots disponibles para el servicio en la fecha solicitada.** Por favor, elige otra fecha.";
pub const INVALID_TIME: &str = "❌ **Formato de hora incorrecto.** Por favor, proporciona la hora para tu reserva (HH:MM).";
pub const SLOT_UNAVAILABLE: &str = "❌ **Lo siento, no hay slots disponibles para el servicio en la fecha y hora solicitada.** Por favor, elige otra fecha u hora.";
pub const BOOKING_ERROR: &str = "❌ **Hubo un error al registrar tu reserva.** Por favor, intenta de nuevo.";
pub const GOODBYE: &str = "**Muchas gracias, no dudes en escribirnos. Estamos para servirte.** 🙌";
pub const NOT_UNDERSTOOD: &str = "❓ **Lo siento, no entiendo tu mensaje. ¿Puedes reformularlo?**";
pub const FALLBACK: &str = "❌ **Lo siento, no entiendo tu mensaje.**";

const PRICE_KEYWORDS: &[&str] = &["cuanto cuesta", "cuánto cuesta", "costo", "precio"];
const SPECIFIC_QUERY_KEYWORDS: &[&str] = &["consulta especifica", "consulta específica"];
const OTHER_SERVICE_KEYWORD: &str = "reservar otro servicio";

const AFFIRMATIVE: &[&str] = &[
    "si",
    "sí",
    "si.",
    "sí.",
    "ok",
    "por supuesto",
    "esta bien",
    "claro",
    "reservar",
    "reservar servicio",
    "deseo reservar servicio",
    "procedo con la reserva",
    "deseo proceder con la reserva de servicio",
];

const CLOSING: &[&str] = &["no", "ninguna", "gracias", "nada", "nada gracias", "nada más"];

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Result of one handled message: the reply, the state to move to, and
/// whether the turn counts as a successful interaction.
#[derive(Debug)]
pub struct Turn {
    pub reply: String,
    pub next: ConversationState,
    pub success: bool,
}

impl Turn {
    fn to(next: ConversationState, reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            next,
            success: false,
        }
    }

    fn succeeded(mut self) -> Self {
        self.success = true;
        self
    }
}

pub async fn process_message(
    state: &Arc<AppState>,
    session_id: &str,
    message: &str,
) -> anyhow::Result<String> {
    let _turn_guard = state.sessions.acquire(session_id).await;

    let now = Utc::now().naive_utc();
    let ttl = Duration::minutes(state.config.session_ttl_minutes);

    let mut session = {
        let db = state.db();
        queries::get_session(&db, session_id)?
    }
    .unwrap_or_else(|| Session::new(session_id, now, ttl));

    let previous = session.state.clone();
    let masked = previous.expects_secret();

    tracing::info!(session = session_id, state = previous.as_str(), "processing message");

    let turn = match dispatch(state, &mut session, previous.clone(), message).await {
        Ok(turn) => turn,
        Err(e) => {
            tracing::error!(session = session_id, state = previous.as_str(), error = %e, "turn failed");
            Turn::to(previous.clone(), FALLBACK)
        }
    };

    let user_id = turn.next.user_id().or_else(|| previous.user_id());
    tracing::debug!(
        session = session_id,
        from = previous.as_str(),
        to = turn.next.as_str(),
        "state transition"
    );

    session.state = turn.next;
    session.last_activity = now;
    session.expires_at = now + ttl;

    let saved = {
        let db = state.db();
        queries::save_session(&db, &session)
    };
    if let Err(e) = saved {
        // The turn's side effects already happened, so its reply still goes out.
        if !turn.success {
            return Err(e);
        }
        tracing::error!(
            session = session_id,
            state = session.state.as_str(),
            reply = %turn.reply,
            error = %e,
            "failed to save session after a completed turn"
        );
    }

    let logged_message = if masked { MASKED_SECRET } else { message };
    record_interaction(state, user_id, logged_message, &turn.reply, turn.success);

    Ok(turn.reply)
}

async fn dispatch(
    state: &Arc<AppState>,
    session: &mut Session,
    current: ConversationState,
    message: &str,
) -> anyhow::Result<Turn> {
    use ConversationState as S;

    let input = message.trim();

    match current {
        S::Start => Ok(start(session)),
        S::AskEmail => ask_email(state, input),
        S::AskName { draft } => Ok(ask_name(draft, input)),
        S::AskPhone { draft } => Ok(ask_phone(draft, input)),
        S::AskAddress { draft } => Ok(ask_address(draft, input)),
        S::AskCountry { draft } => Ok(ask_country(draft, input)),
        S::AskBirthDate { draft } => Ok(ask_birth_date(draft, input)),
        S::AskGender { draft } => Ok(ask_gender(draft, input)),
        S::AskBrand { owner } => Ok(ask_brand(owner, input)),
        S::AskModel { owner, brand } => Ok(ask_model(owner, brand, input)),
        S::AskYear {
            owner,
            brand,
            model,
        } => ask_year(state, session, owner, brand, model, input).await,
        S::AskPassword { account } => ask_password(state, account, input),
        S::ConfirmPassword {
            account,
            password_digest,
        } => confirm_password(state, session, account, password_digest, input).await,
        S::ChooseService { customer } => choose_service(state, session, customer, input),
        S::ConfirmService { customer, request } => Ok(confirm_service(customer, request, input)),
        S::SpecificQuery { customer, request } => {
            Ok(specific_query(state, customer, request, input).await)
        }
        S::AskDate { customer, request } => ask_date(state, customer, request, input),
        S::AskTime {
            customer,
            request,
            date,
        } => ask_time(state, session, customer, request, date, input).await,
        S::Farewell {
            customer,
            booked_at,
        } => Ok(farewell(session, customer, booked_at, input)),
    }
}

fn start(session: &mut Session) -> Turn {
    session.counters.queries_started += 1;
    session.registration_started_at = Some(Utc::now().naive_utc());
    Turn::to(ConversationState::AskEmail, GREETING).succeeded()
}

fn ask_email(state: &Arc<AppState>, input: &str) -> anyhow::Result<Turn> {
    if !is_valid_email(input) {
        return Ok(Turn::to(ConversationState::AskEmail, INVALID_EMAIL));
    }

    let found = {
        let db = state.db();
        match queries::find_user_by_email(&db, input)? {
            Some(user) => {
                let vehicle = queries::find_vehicle_for_user(&db, user.id)?;
                Some((user, vehicle))
            }
            None => None,
        }
    };

    let turn = match found {
        Some((user, Some(vehicle))) => {
            let reply = format!(
                "¡Hola de nuevo, **{}!** 👋 ¿Qué servicio deseas reservar hoy o cuéntame qué problema tiene tu auto?",
                user.first_name
            );
            let customer = Customer {
                user_id: user.id,
                vehicle_id: vehicle.id,
                name: user.first_name,
            };
            Turn::to(ConversationState::ChooseService { customer }, reply).succeeded()
        }
        Some((user, None)) => Turn::to(
            ConversationState::AskBrand {
                owner: VehicleOwner::Existing {
                    user_id: user.id,
                    name: user.first_name,
                },
            },
            NO_VEHICLE,
        ),
        None => Turn::to(
            ConversationState::AskName {
                draft: ProfileDraft::new(input),
            },
            NEW_CUSTOMER,
        ),
    };

    Ok(turn)
}

fn ask_name(mut draft: ProfileDraft, input: &str) -> Turn {
    if input.is_empty() {
        return Turn::to(ConversationState::AskName { draft }, EMPTY_ANSWER);
    }

    let reply = format!(
        "Gracias, **{input}** 🙏. Ahora, ¿puedes proporcionarme tu número de teléfono? 📞"
    );
    draft.name = Some(input.to_string());
    Turn::to(ConversationState::AskPhone { draft }, reply)
}

fn ask_phone(mut draft: ProfileDraft, input: &str) -> Turn {
    if !is_valid_phone(input) {
        return Turn::to(ConversationState::AskPhone { draft }, INVALID_PHONE);
    }

    draft.phone = Some(input.to_string());
    Turn::to(ConversationState::AskAddress { draft }, ASK_ADDRESS)
}

fn ask_address(mut draft: ProfileDraft, input: &str) -> Turn {
    if input.is_empty() {
        return Turn::to(ConversationState::AskAddress { draft }, EMPTY_ANSWER);
    }

    draft.address = Some(input.to_string());
    Turn::to(ConversationState::AskCountry { draft }, ASK_COUNTRY)
}

fn ask_country(mut draft: ProfileDraft, input: &str) -> Turn {
    if input.is_empty() {
        return Turn::to(ConversationState::AskCountry { draft }, EMPTY_ANSWER);
    }

    draft.country = Some(input.to_string());
    Turn::to(ConversationState::AskBirthDate { draft }, ASK_BIRTH_DATE)
}

fn ask_birth_date(mut draft: ProfileDraft, input: &str) -> Turn {
    match parse_date(input) {
        Some(date) => {
            draft.birth_date = Some(date);
            Turn::to(ConversationState::AskGender { draft }, ASK_GENDER)
        }
        None => Turn::to(ConversationState::AskBirthDate { draft }, INVALID_BIRTH_DATE),
    }
}

fn ask_gender(draft: ProfileDraft, input: &str) -> Turn {
    let Some(gender) = Gender::parse(input) else {
        return Turn::to(ConversationState::AskGender { draft }, INVALID_GENDER);
    };

    let email = draft.email.clone();
    match draft.complete(gender) {
        Some(profile) => Turn::to(
            ConversationState::AskBrand {
                owner: VehicleOwner::New { profile },
            },
            ASK_BRAND,
        ),
        None => {
            tracing::warn!("registration draft incomplete at gender step, restarting");
            Turn::to(
                ConversationState::AskName {
                    draft: ProfileDraft::new(email),
                },
                NEW_CUSTOMER,
            )
        }
    }
}

fn ask_brand(owner: VehicleOwner, input: &str) -> Turn {
    if input.is_empty() {
        return Turn::to(ConversationState::AskBrand { owner }, EMPTY_ANSWER);
    }

    Turn::to(
        ConversationState::AskModel {
            owner,
            brand: input.to_string(),
        },
        ASK_MODEL,
    )
}

fn ask_model(owner: VehicleOwner, brand: String, input: &str) -> Turn {
    if input.is_empty() {
        return Turn::to(ConversationState::AskModel { owner, brand }, EMPTY_ANSWER);
    }

    Turn::to(
        ConversationState::AskYear {
            owner,
            brand,
            model: input.to_string(),
        },
        ASK_YEAR,
    )
}

async fn ask_year(
    state: &Arc<AppState>,
    session: &Session,
    owner: VehicleOwner,
    brand: String,
    model: String,
    input: &str,
) -> anyhow::Result<Turn> {
    let stay = |owner: VehicleOwner, brand: String, model: String, reply: &'static str| {
        Turn::to(
            ConversationState::AskYear {
                owner,
                brand,
                model,
            },
            reply,
        )
    };

    let year = match validate_year(input, Utc::now().year()) {
        Ok(year) => year,
        Err(reply) => return Ok(stay(owner, brand, model, reply)),
    };

    let vehicle = VehicleSpec {
        brand: brand.clone(),
        model: model.clone(),
        year,
    };

    match owner {
        VehicleOwner::New { profile } => Ok(Turn::to(
            ConversationState::AskPassword {
                account: PendingAccount {
                    profile,
                    vehicle,
                    request_token: uuid::Uuid::new_v4().to_string(),
                },
            },
            ASK_PASSWORD,
        )),
        VehicleOwner::Existing { user_id, name } => {
            let token = format!("vehicle-{}-{user_id}", session.id);
            match state
                .backend
                .create_vehicle(&vehicle.to_new_vehicle(user_id), &token)
                .await
            {
                Ok(vehicle_id) => {
                    let reply = format!(
                        "**Gracias {name}** 🙌. **Hemos registrado tu vehículo.** ¿Qué servicio deseas reservar hoy o cuéntame qué problema tiene tu auto? 🚗"
                    );
                    let customer = Customer {
                        user_id,
                        vehicle_id,
                        name,
                    };
                    Ok(Turn::to(ConversationState::ChooseService { customer }, reply).succeeded())
                }
                Err(e) => {
                    tracing::error!(user_id, error = %e, "vehicle registration failed");
                    Ok(stay(
                        VehicleOwner::Existing { user_id, name },
                        brand,
                        model,
                        VEHICLE_ERROR,
                    ))
                }
            }
        }
    }
}

fn ask_password(state: &Arc<AppState>, account: PendingAccount, input: &str) -> anyhow::Result<Turn> {
    if input.is_empty() {
        return Ok(Turn::to(ConversationState::AskPassword { account }, ASK_PASSWORD));
    }

    let salt = uuid::Uuid::new_v4().simple().to_string();
    let password_digest = registry::password_digest(&state.config.secret_key, input, &salt)?;

    Ok(Turn::to(
        ConversationState::ConfirmPassword {
            account,
            password_digest,
        },
        CONFIRM_PASSWORD,
    ))
}

async fn confirm_password(
    state: &Arc<AppState>,
    session: &Session,
    account: PendingAccount,
    password_digest: String,
    input: &str,
) -> anyhow::Result<Turn> {
    if !registry::verify_password(&state.config.secret_key, input, &password_digest) {
        return Ok(Turn::to(
            ConversationState::AskPassword { account },
            PASSWORD_MISMATCH,
        ));
    }

    // A resubmission re-sends the same data under the same request token.
    let new_user = account.profile.to_new_user(input);
    let user_id = match state
        .backend
        .create_user(&new_user, &account.request_token)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "user registration failed");
            return Ok(Turn::to(
                ConversationState::ConfirmPassword {
                    account,
                    password_digest,
                },
                USER_ERROR,
            ));
        }
    };

    let new_vehicle = account.vehicle.to_new_vehicle(user_id);
    let vehicle_id = match state
        .backend
        .create_vehicle(&new_vehicle, &account.request_token)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(user_id, error = %e, "vehicle registration failed");
            return Ok(Turn::to(
                ConversationState::ConfirmPassword {
                    account,
                    password_digest,
                },
                VEHICLE_ERROR,
            ));
        }
    };

    let finished = Utc::now().naive_utc();
    let started = session.registration_started_at.unwrap_or(finished);
    {
        let db = state.db();
        if let Err(e) = queries::insert_registration_timing(&db, user_id, &started, &finished) {
            tracing::error!(user_id, error = %e, "failed to record registration timing");
        }
    }

    tracing::info!(user_id, vehicle_id, "customer registered");

    let name = account.profile.name;
    let reply = format!(
        "**Muchas gracias {name}** 🙌. **Hemos registrado tu información. Cuéntame,** **¿Qué servicio deseas reservar hoy o cuéntame qué problema tiene tu auto?** 🚗"
    );
    let customer = Customer {
        user_id,
        vehicle_id,
        name,
    };
    Ok(Turn::to(ConversationState::ChooseService { customer }, reply).succeeded())
}

enum Recommendation {
    Problem(String),
    Service(String),
}

fn choose_service(
    state: &Arc<AppState>,
    session: &mut Session,
    customer: Customer,
    input: &str,
) -> anyhow::Result<Turn> {
    let query = input.to_lowercase();
    session.service_started_at = Some(Utc::now().naive_utc());

    let services = catalog::load_services(&state.config.data_dir);
    let problems = catalog::load_problems(&state.config.data_dir);

    let by_problem = matcher::find_problem(&problems, &query, state.config.problem_match_threshold);
    let by_service = matcher::find_service(&services, &query, state.config.service_match_threshold);

    tracing::info!(
        problem_score = by_problem.as_ref().map(|m| m.score),
        service_score = by_service.as_ref().map(|m| m.score),
        "matched service request"
    );

    let recommendation = match (by_problem, by_service) {
        (Some(p), Some(s)) if p.score > s.score => Some(Recommendation::Problem(p.service_name)),
        (Some(p), None) => Some(Recommendation::Problem(p.service_name)),
        (_, Some(s)) => Some(Recommendation::Service(s.service_name)),
        (None, None) => None,
    };

    let resolved = match &recommendation {
        Some(Recommendation::Problem(name) | Recommendation::Service(name)) => {
            let db = state.db();
            queries::find_service_by_catalog_name(&db, name)?
        }
        None => None,
    };

    let (request, reply, success) = match (recommendation, resolved) {
        (Some(rec), Some(service)) => {
            let lead = match rec {
                Recommendation::Problem(_) => "**Posible problema puede ser**",
                Recommendation::Service(_) => "**Sí, tenemos el servicio de**",
            };
            let reply = format!(
                "{lead} '{}' 🔧. **¿Deseas reservar este servicio, 🛠️ otro servicio, 💰 consultar precio o tienes una CONSULTA ESPECIFICA de servicios o problemas automotrices?** 🚗",
                service.name
            );
            let request = ServiceRequest {
                service: SelectedService {
                    id: service.id,
                    name: service.name,
                    price: service.price,
                },
                problem: query,
            };
            (Some(request), reply, true)
        }
        (Some(Recommendation::Problem(name) | Recommendation::Service(name)), None) => {
            tracing::warn!(service = %name, "matched catalog service has no record");
            (None, SERVICE_UNAVAILABLE.to_string(), false)
        }
        (None, _) => (None, SERVICE_UNAVAILABLE.to_string(), false),
    };

    // An unmatched request still moves on; the next state carries no service.
    let turn = Turn::to(ConversationState::ConfirmService { customer, request }, reply);
    Ok(if success { turn.succeeded() } else { turn })
}

fn confirm_service(customer: Customer, request: Option<ServiceRequest>, input: &str) -> Turn {
    let answer = input.to_lowercase();

    if PRICE_KEYWORDS.iter().any(|k| answer.contains(k)) {
        let reply = match &request {
            Some(r) => format!(
                "💰 **El servicio** '{}' **tiene un costo de** {:.2} **soles. ¿Deseas reservar este servicio, 🛠️ otro servicio 🔍 o tienes una CONSULTA ESPECIFICA de servicios o problemas automotrices?**",
                r.service.name, r.service.price
            ),
            None => NO_SERVICE_SELECTED.to_string(),
        };
        return Turn::to(ConversationState::ConfirmService { customer, request }, reply);
    }

    if AFFIRMATIVE.contains(&answer.as_str()) {
        return match request {
            Some(request) => Turn::to(ConversationState::AskDate { customer, request }, ASK_DATE),
            None => Turn::to(ConversationState::ChooseService { customer }, NO_SERVICE_SELECTED),
        };
    }

    if answer.contains(OTHER_SERVICE_KEYWORD) {
        return Turn::to(ConversationState::ChooseService { customer }, OTHER_SERVICE);
    }

    if SPECIFIC_QUERY_KEYWORDS.iter().any(|k| answer.contains(k)) {
        return Turn::to(ConversationState::SpecificQuery { customer, request }, ASK_QUERY);
    }

    Turn::to(ConversationState::ConfirmService { customer, request }, SERVICE_MENU)
}

async fn specific_query(
    state: &Arc<AppState>,
    customer: Customer,
    request: Option<ServiceRequest>,
    input: &str,
) -> Turn {
    let answer = ai::answer(state.llm.as_ref(), &input.to_lowercase()).await;

    let follow_up = match &request {
        Some(r) => format!(
            "¿ ℹ️ Hay algo más que quieras saber 📝 o deseas proceder con la reserva del servicio 📅 '{}'?",
            r.service.name
        ),
        None => "¿ ℹ️ Hay algo más que quieras saber 📝 o deseas reservar otro servicio?".to_string(),
    };

    Turn::to(
        ConversationState::ConfirmService { customer, request },
        format!("ℹ️ {answer} {follow_up}"),
    )
}

fn ask_date(
    state: &Arc<AppState>,
    customer: Customer,
    request: ServiceRequest,
    input: &str,
) -> anyhow::Result<Turn> {
    let Some(date) = parse_date(input) else {
        return Ok(Turn::to(ConversationState::AskDate { customer, request }, INVALID_DATE));
    };

    let service_id = request.service.id;
    let slots = {
        let db = state.db();
        let mut slots = queries::get_available_slots(&db, service_id, &date)?;
        if slots.is_empty() {
            scheduling::generate_slots(&db, service_id, date, date)?;
            slots = queries::get_available_slots(&db, service_id, &date)?;
        }
        slots
    };

    if slots.is_empty() {
        return Ok(Turn::to(
            ConversationState::AskDate { customer, request },
            NO_SLOTS_ON_DATE,
        ));
    }

    let times: Vec<String> = slots
        .iter()
        .map(|s| s.start_time.format("%H:%M").to_string())
        .collect();
    let reply = format!(
        "🕒 **Para la fecha** {date}, **tenemos estos horarios disponibles:** {}. **Por favor, selecciona uno de estos horarios (HH:MM).**",
        times.join(", ")
    );

    Ok(Turn::to(
        ConversationState::AskTime {
            customer,
            request,
            date,
        },
        reply,
    ))
}

async fn ask_time(
    state: &Arc<AppState>,
    session: &mut Session,
    customer: Customer,
    request: ServiceRequest,
    date: NaiveDate,
    input: &str,
) -> anyhow::Result<Turn> {
    let stay = |customer: Customer, request: ServiceRequest, reply: &'static str| {
        Turn::to(
            ConversationState::AskTime {
                customer,
                request,
                date,
            },
            reply,
        )
    };

    let Ok(time) = NaiveTime::parse_from_str(input, "%H:%M") else {
        return Ok(stay(customer, request, INVALID_TIME));
    };

    // Claim the slot before booking; a second claimant finds it taken.
    let claimed = {
        let db = state.db();
        match queries::find_available_slot(&db, request.service.id, &date, &time)? {
            Some(slot) if queries::reserve_slot(&db, slot.id)? => Some(slot),
            _ => None,
        }
    };

    let Some(slot) = claimed else {
        return Ok(stay(customer, request, SLOT_UNAVAILABLE));
    };

    let date_time = NaiveDateTime::new(date, time);
    let booking = NewBooking {
        user_id: customer.user_id,
        vehicle_id: customer.vehicle_id,
        service_id: request.service.id,
        slot_id: slot.id,
        problem: request.problem.clone(),
        date_time: date_time.format("%Y-%m-%d %H:%M:%S").to_string(),
    };
    let token = format!("booking-{}-{}", session.id, slot.id);

    let booking_id = match state.backend.create_booking(&booking, &token).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(slot_id = slot.id, error = %e, "booking failed, releasing slot");
            let db = state.db();
            queries::release_slot(&db, slot.id)?;
            return Ok(stay(customer, request, BOOKING_ERROR));
        }
    };

    let finished = Utc::now().naive_utc();
    let started = session.service_started_at.unwrap_or(finished);
    {
        let db = state.db();
        if let Err(e) = queries::insert_service_timing(&db, booking_id, &started, &finished) {
            tracing::error!(booking_id, error = %e, "failed to record service timing");
        }
    }

    session.counters.requests_served += 1;
    session.counters.conversions += 1;

    tracing::info!(booking_id, slot_id = slot.id, user_id = customer.user_id, "booking confirmed");

    let reply = format!(
        "**Reserva creada exitosamente con código** {booking_id} ✅ **para el servicio** '{}' **el** {}. **¿Necesitas algo más?** 😊",
        request.service.name,
        date_time.format("%Y-%m-%d a las %H:%M")
    );
    let next = ConversationState::Farewell {
        customer,
        booked_at: date_time,
    };
    Ok(Turn::to(next, reply).succeeded())
}

fn farewell(
    session: &mut Session,
    customer: Customer,
    booked_at: NaiveDateTime,
    input: &str,
) -> Turn {
    if CLOSING.contains(&input.to_lowercase().as_str()) {
        session.reset();
        return Turn::to(ConversationState::Start, GOODBYE);
    }

    // The time just booked was taken by this very session.
    let reply = match NaiveTime::parse_from_str(input, "%H:%M") {
        Ok(time) if time == booked_at.time() => SLOT_UNAVAILABLE,
        _ => NOT_UNDERSTOOD,
    };

    Turn::to(
        ConversationState::Farewell {
            customer,
            booked_at,
        },
        reply,
    )
}

pub fn is_valid_email(s: &str) -> bool {
    EMAIL.is_match(s)
}

pub fn is_valid_phone(s: &str) -> bool {
    s.len() == 9 && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn validate_year(input: &str, current_year: i32) -> Result<i32, &'static str> {
    let year: i32 = input.parse().map_err(|_| INVALID_YEAR)?;
    if year > current_year {
        return Err(FUTURE_YEAR);
    }
    Ok(year)
}
