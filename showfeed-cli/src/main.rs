use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use showfeed_client::{
    ClientError, EventDetail, EventSummary, FeedController, FileStore, FilterCriteria,
    GatewayError, KNOWN_CATEGORIES, LikeToggle, NewPerformance, Registration, Session,
    SessionError, SessionStore, ShowfeedClient, UserIdentity,
};
use tracing::debug;

mod logging;
mod settings;

use logging::init_logging;
use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "showfeed-cli", version, about = "CLI клиент афиши уличных выступлений")]
struct Cli {
    /// Адрес API (перекрывает SHOWFEED_API_URL).
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Регистрация пользователя.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Вход пользователя.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Выход: удаляет сохранённую сессию.
    Logout,
    /// Текущий пользователь.
    Whoami,
    /// Локальное изменение профиля.
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Лента выступлений.
    ///
    /// `--pages` подгружает страницы одну за другой, как бесконечная прокрутка.
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 1)]
        pages: u32,
        /// Перезагрузить первую страницу после загрузки (pull-to-refresh).
        #[arg(long)]
        refresh: bool,
    },
    /// Категории для быстрого фильтра.
    Categories,
    /// Подробности выступления.
    Show {
        #[arg(long)]
        id: i64,
    },
    /// Поставить или снять лайк.
    Like {
        #[arg(long)]
        id: i64,
    },
    /// Заявка на новое выступление.
    Submit {
        #[arg(long)]
        title: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        location: String,
        /// Дата в формате YYYY-MM-DD.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Время в формате HH:MM.
        #[arg(long, value_parser = parse_hour_minute)]
        time: Option<NaiveTime>,
        #[arg(long)]
        price: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        contact: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Ошибка: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;
    init_logging(&settings.log_level)?;

    let session = Arc::new(SessionStore::new(FileStore::new(&settings.session_file)));
    session.on_invalidated(|event| {
        let username = event.user.as_ref().map(|user| user.username.as_str());
        eprintln!(
            "Сессия истекла{}: выполните `showfeed-cli login ...`",
            username.map(|name| format!(" ({name})")).unwrap_or_default()
        );
    });

    let config = settings.client_config(cli.server);
    debug!(base_url = config.base_url.as_str(), "client configured");
    let client = ShowfeedClient::new(config, Arc::clone(&session)).map_err(map_client_error)?;

    match cli.command {
        Command::Register {
            username,
            password,
            name,
            email,
            phone,
        } => {
            let registration = Registration {
                username,
                password,
                name,
                email,
                phone,
            };
            let session = client
                .register(&registration)
                .await
                .map_err(map_client_error)?;
            print_session("Регистрация успешна", &session);
        }
        Command::Login { username, password } => {
            let session = client
                .login(&username, &password)
                .await
                .map_err(map_client_error)?;
            print_session("Вход выполнен", &session);
        }
        Command::Logout => {
            client.logout().map_err(map_client_error)?;
            println!("Выход выполнен");
        }
        Command::Whoami => {
            let session = session
                .try_load()
                .context("не удалось прочитать файл сессии")?;
            if session.is_empty() {
                println!("Вход не выполнен");
            } else {
                print_session("Текущая сессия", &session);
            }
        }
        Command::Profile { name, email, phone } => {
            let updated = client
                .update_profile(|user| apply_profile(user, name, email, phone))
                .map_err(map_client_error)?;
            match updated {
                Some(user) => print_user("Профиль обновлён", &user),
                None => println!("Вход не выполнен"),
            }
        }
        Command::List {
            search,
            category,
            pages,
            refresh,
        } => {
            let filters = FilterCriteria::new(
                search.unwrap_or_default(),
                category.unwrap_or_default(),
            );
            let feed = load_feed(&client, filters, pages, refresh)
                .await
                .map_err(|err| map_client_error(err.into()))?;
            print_feed(&feed);
        }
        Command::Categories => {
            for category in KNOWN_CATEGORIES {
                println!("- {category}");
            }
        }
        Command::Show { id } => {
            let detail = client.get_performance(id).await.map_err(map_client_error)?;
            print_detail(&detail);
        }
        Command::Like { id } => {
            let mut detail = client.get_performance(id).await.map_err(map_client_error)?;
            let mut toggle = LikeToggle::new();
            let outcome = toggle
                .toggle(&client, &mut detail)
                .await
                .map_err(|err| map_client_error(err.into()))?;
            if let Some(outcome) = outcome {
                let state = if outcome.is_liked {
                    "Лайк поставлен"
                } else {
                    "Лайк снят"
                };
                println!("{state}: id={id}, likes={}", detail.summary.likes);
            }
        }
        Command::Submit {
            title,
            group,
            location,
            date,
            time,
            price,
            category,
            description,
            contact,
        } => {
            let mut form = NewPerformance::new(title, group, location);
            form.date = date;
            form.time = time;
            form.price = price;
            form.category = category;
            form.description = description;
            form.contact = contact;

            let message = client
                .submit_performance(form)
                .await
                .map_err(map_client_error)?;
            println!(
                "{}",
                message.unwrap_or_else(|| "Заявка отправлена".to_string())
            );
        }
    }

    Ok(())
}

async fn load_feed(
    client: &ShowfeedClient,
    filters: FilterCriteria,
    pages: u32,
    refresh: bool,
) -> Result<FeedController, GatewayError> {
    let mut feed = client.feed();
    let first = match feed.set_filters(filters) {
        Some(request) => request,
        None => feed.reload(),
    };
    feed.drive(client, first).await?;

    for _ in 1..pages {
        let Some(request) = feed.load_more() else {
            break;
        };
        feed.drive(client, request).await?;
    }

    if refresh {
        let request = feed.refresh();
        feed.drive(client, request).await?;
    }
    Ok(feed)
}

fn apply_profile(
    user: &mut UserIdentity,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
) {
    if let Some(name) = name {
        user.display_name = name;
    }
    if let Some(email) = email {
        user.email = email;
    }
    if let Some(phone) = phone {
        let phone = phone.trim().to_string();
        user.phone = if phone.is_empty() { None } else { Some(phone) };
    }
}

fn parse_hour_minute(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| format!("ожидается время в формате HH:MM, получено `{raw}`"))
}

fn map_client_error(err: ClientError) -> anyhow::Error {
    let message = match err {
        ClientError::Gateway(GatewayError::Unauthorized { .. }) => {
            "требуется авторизация: выполните `showfeed-cli login ...`".to_string()
        }
        ClientError::Gateway(GatewayError::Unreachable(details)) => {
            format!("сервер недоступен: {details}")
        }
        ClientError::Gateway(err @ GatewayError::Rejected { .. }) => {
            format!("запрос отклонён: {}", err.user_message())
        }
        ClientError::Gateway(GatewayError::InvalidResponse(details)) => {
            format!("некорректный ответ сервера: {details}")
        }
        ClientError::AuthFailed(message) => message,
        ClientError::Validation(errors) => {
            let field_errors = errors.field_errors();
            let mut fields: Vec<&str> = field_errors.keys().map(|key| key.as_ref()).collect();
            fields.sort_unstable();
            format!("не заполнены обязательные поля: {}", fields.join(", "))
        }
        ClientError::Session(SessionError::Storage(err)) => {
            format!("не удалось сохранить сессию: {err}")
        }
        ClientError::Session(err) => format!("ошибка сессии: {err}"),
        ClientError::Setup(details) => format!("не удалось создать клиент: {details}"),
    };
    anyhow::anyhow!(message)
}

fn print_user(title: &str, user: &UserIdentity) {
    println!("{title}");
    println!("  id: {}", user.id);
    println!("  username: {}", user.username);
    println!("  name: {}", user.display_name);
    println!("  email: {}", user.email);
    if let Some(phone) = &user.phone {
        println!("  phone: {phone}");
    }
}

fn print_session(title: &str, session: &Session) {
    match session.user() {
        Some(user) => print_user(title, user),
        None => println!("{title}"),
    }
    let token = if session.credential().is_some() {
        "сохранён"
    } else {
        "нет"
    };
    println!("token: {token}");
}

fn summary_line(event: &EventSummary) -> String {
    format!(
        "- [{}] {} / {} ({}, {} {}) ♥{}",
        event.id,
        event.title,
        event.group_name,
        event.location,
        event.date,
        event.time,
        event.likes
    )
}

fn print_feed(feed: &FeedController) {
    let filters = feed.filters();
    println!(
        "Выступлений: {} (страниц: {}, ещё есть: {}, поиск: `{}`, категория: `{}`)",
        feed.items().len(),
        feed.page(),
        if feed.has_next() { "да" } else { "нет" },
        filters.search_text,
        filters.category
    );
    for event in feed.items() {
        println!("{}", summary_line(event));
    }
}

fn print_detail(detail: &EventDetail) {
    let summary = &detail.summary;
    println!("{}", summary.title);
    println!("id: {}", summary.id);
    println!("group: {}", summary.group_name);
    println!("category: {}", summary.category);
    println!("location: {}", summary.location);
    if let Some(address) = &detail.address {
        println!("address: {address}");
    }
    println!("date: {} {}", summary.date, summary.time);
    println!("price: {}", summary.price);
    println!("likes: {}, views: {}", summary.likes, detail.view_count);
    if let Some(ticket_url) = &detail.ticket_url {
        println!("tickets: {ticket_url}");
    }
    if !detail.purchase_methods.is_empty() {
        println!("purchase: {}", detail.purchase_methods.join(", "));
    }
    if !detail.description.is_empty() {
        println!();
        println!("{}", detail.description);
    }
}
