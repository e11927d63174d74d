//! Static localization tables for the reCAPTCHA widget.
//!
//! The widget renders its labels in the host page's language, so every
//! text-based query is built from the full list of known variants of a label
//! (see [`crate::selector::TextPattern`]). The object table maps the
//! localized grid-challenge instruction back to the fixed category
//! identifier the classification backend expects. These tables are data:
//! an unrecognized instruction is a clean "no match", never a guess.

use crate::selector::TextPattern;

pub const IM_NOT_A_ROBOT: &[&str] = &[
    "I'm not a robot",
    "Я не робот",
    "进行人机身份验证",
    "No soy un robot",
    "Je ne suis pas un robot",
    "Ich bin kein Roboter",
    "Ik ben geen robot",
];

pub const GET_AN_AUDIO_CHALLENGE: &[&str] = &[
    "Get an audio challenge",
    "Пройти аудиотест",
    "改用音频验证",
    "Obtener una pista sonora",
    "Générer un test audio",
    "Audio-Captcha abrufen",
    "Een audio-uitdaging ophalen",
];

pub const GET_A_VISUAL_CHALLENGE: &[&str] = &[
    "Get a visual challenge",
    "Пройти визуальный тест",
    "改用图片验证",
    "Obtener una pista visual",
    "Générer un test visuel",
    "Visuelles Captcha abrufen",
    "Een visuele uitdaging ophalen",
];

pub const GET_A_NEW_CHALLENGE: &[&str] = &[
    "Get a new challenge",
    "Обновить",
    "换一个新的验证码",
    "Obtener una pista nueva",
    "Générer un nouveau test",
    "Neues Captcha abrufen",
    "Een nieuwe uitdaging ophalen",
];

pub const DOWNLOAD_AUDIO_AS_MP3: &[&str] = &[
    "Alternatively, download audio as MP3",
    "Скачать MP3-файл",
    "或者以 MP3 格式下载音频",
    "También puedes descargar el audio en formato MP3",
    "Ou téléchargez le fichier audio au format MP3",
    "Audio als MP3 herunterladen",
    "Of download het geluid als MP3-bestand",
];

pub const ENTER_WHAT_YOU_HEAR: &[&str] = &[
    "Enter what you hear",
    "Введите прозвучавшие слова",
    "请输入您听到的内容",
    "Escribe lo que escuches",
    "Saisissez ce que vous entendez",
    "Geben Sie ein, was Sie hören",
    "Geef op wat je hoort",
];

pub const SKIP: &[&str] = &[
    "Skip",
    "Пропустить",
    "跳过",
    "Saltar",
    "Ignorer",
    "Überspringen",
    "Overslaan",
];

pub const NEXT: &[&str] = &["Next", "Далее", "下一个", "Siguiente", "Suivant", "Weiter", "Volgende"];

pub const VERIFY: &[&str] = &[
    "Verify",
    "Подтвердить",
    "验证",
    "Verificar",
    "Valider",
    "Bestätigen",
    "Verifiëren",
];

pub const TRY_AGAIN_LATER: &[&str] = &[
    "Try again later",
    "Повторите попытку позже",
    "稍后重试",
    "Inténtalo de nuevo más tarde",
    "Réessayez plus tard",
    "Später noch einmal versuchen",
    "Probeer het later opnieuw",
];

pub const MULTIPLE_CORRECT_SOLUTIONS_REQUIRED: &[&str] = &[
    "Multiple correct solutions required - please solve more",
    "Вы должны выполнить несколько заданий",
    "需要提供多个正确答案 - 请回答更多问题",
    "Debes resolver más captchas",
    "Veuillez effectuer d'autres tests (vous devez fournir plusieurs solutions correctes)",
    "Es sind mehrere richtige Lösungen erforderlich. Bitte weitere Aufgaben lösen",
    "Er zijn meerdere juiste oplossingen vereist - geef meer oplossingen op",
];

pub const PRESS_PLAY_TO_LISTEN: &[&str] = &[
    "Press PLAY to listen",
    "Чтобы прослушать, нажмите \"Воспроизвести\"",
    "按“播放”可听语音内容",
    "Pulsa REPRODUCIR para escuchar el audio",
    "Appuyez sur LECTURE pour écouter",
    "Wählen Sie WIEDERGABE aus, um die Wiedergabe zu starten",
    "Druk op AFSPELEN om te luisteren",
];

pub const PLEASE_TRY_AGAIN: &[&str] = &[
    "Please try again",
    "Повторите попытку",
    "请重试",
    "Inténtalo de nuevo",
    "Veuillez réessayer",
    "Versuche es bitte erneut",
    "Probeer het opnieuw",
];

pub const PLEASE_ALSO_CHECK_THE_NEW_IMAGES: &[&str] = &[
    "Please also check the new images",
    "Просмотрите также новые изображение",
    "另外，您还需查看新显示的图片",
    "Comprueba también las imágenes nuevas",
    "Veuillez également vérifier les nouvelles images",
    "Sehen Sie sich auch die neuen Bilder an",
    "Controleer ook de nieuwe afbeeldingen",
];

pub const PLEASE_SELECT_ALL_MATCHING_IMAGES: &[&str] = &[
    "Please select all matching images",
    "Выберите все совпадающие изображения",
    "请选择所有相符的图片",
    "Selecciona todas las imágenes que coincidan",
    "Veuillez sélectionner toutes les images correspondantes",
    "Wählen Sie alle passenden Bilder aus",
    "Selecteer alle overeenkomende afbeeldingen",
];

/// Compile the anchored pattern matching any localized variant of a label.
pub fn label_pattern(variants: &[&str]) -> TextPattern {
    TextPattern::any_of(variants)
}

/// One grid-challenge object class: the provider's fixed category identifier
/// plus every known localized spelling of the object name.
pub struct ObjectClass {
    pub id: &'static str,
    pub names: &'static [&'static str],
}

/// The known object classes, keyed by the Freebase MID the classification
/// backend expects as the question identifier.
pub const OBJECT_CLASSES: &[ObjectClass] = &[
    ObjectClass {
        id: "/m/0pg52",
        names: &["taxis", "такси", "出租车", "Taxis", "taxi's"],
    },
    ObjectClass {
        id: "/m/02yvhj",
        names: &["school bus", "школьный автобус", "校车", "autobús escolar", "Schulbus", "schoolbus"],
    },
    ObjectClass {
        id: "/m/01bjv",
        names: &[
            "bus", "buses", "автобус", "автобусы", "公交车", "autobuses", "autobús", "Bus",
            "Bussen", "bussen",
        ],
    },
    ObjectClass {
        id: "/m/04_sv",
        names: &[
            "motorcycles",
            "мотоциклы",
            "摩托车",
            "motocicletas",
            "motos",
            "Motorrädern",
            "motorfietsen",
            "motoren",
        ],
    },
    ObjectClass {
        id: "/m/013xlm",
        names: &["tractors", "трактора", "拖拉机", "tractores", "tracteurs", "Traktoren", "tractoren"],
    },
    ObjectClass {
        id: "/m/01jk_4",
        names: &[
            "chimneys",
            "дымовые трубы",
            "烟囱",
            "chimeneas",
            "cheminées",
            "Schornsteinen",
            "schoorstenen",
        ],
    },
    ObjectClass {
        id: "/m/014xcs",
        names: &[
            "crosswalks",
            "пешеходные переходы",
            "人行横道",
            "过街人行道",
            "pasos de peatones",
            "passages pour piétons",
            "Fußgängerüberwegen",
            "oversteekplaatsen",
            "zebrapaden",
        ],
    },
    ObjectClass {
        id: "/m/015qff",
        names: &[
            "traffic lights",
            "светофоры",
            "红绿灯",
            "semáforos",
            "feux de circulation",
            "Ampeln",
            "verkeerslichten",
        ],
    },
    ObjectClass {
        id: "/m/0199g",
        names: &["bicycles", "велосипеды", "自行车", "bicicletas", "vélos", "Fahrrädern", "fietsen"],
    },
    ObjectClass {
        id: "/m/015qbp",
        names: &[
            "parking meters",
            "парковочные автоматы",
            "停车计时器",
            "parquímetros",
            "parcmètres",
            "Parkometern",
            "parkeermeters",
        ],
    },
    ObjectClass {
        id: "/m/0k4j",
        names: &["cars", "автомобили", "小轿车", "coches", "voitures", "Pkws", "auto's"],
    },
    ObjectClass {
        id: "/m/015kr",
        names: &["bridges", "мостами", "桥", "puentes", "ponts", "Brücken", "bruggen"],
    },
    ObjectClass {
        id: "/m/019jd",
        names: &["boats", "лодки", "船", "barcos", "bateaux", "Boote", "boten"],
    },
    ObjectClass {
        id: "/m/0cdl1",
        names: &["palm trees", "пальмы", "棕榈树", "palmeras", "palmiers", "Palmen", "palmbomen"],
    },
    ObjectClass {
        id: "/m/09d_r",
        names: &[
            "mountains or hills",
            "mountain",
            "горы или холмы",
            "montañas o colinas",
            "montagnes ou collines",
            "Berge oder Hügel",
            "bergen of heuvels",
        ],
    },
    ObjectClass {
        id: "/m/01pns0",
        names: &[
            "a fire hydrant",
            "fire hydrants",
            "гидрантами",
            "пожарные гидранты",
            "消防栓",
            "bocas de incendios",
            "una boca de incendios",
            "borne d'incendie",
            "bouches d'incendie",
            "Hydranten",
            "Feuerhydranten",
            "een brandkraan",
            "brandkranen",
        ],
    },
    ObjectClass {
        id: "/m/01lynh",
        names: &["stairs", "лестницы", "楼梯", "escaleras", "escaliers", "Treppen(stufen)", "trappen"],
    },
];

/// Resolve the category identifier for a grid challenge from the first line
/// of its localized instruction text. Returns `None` when no known object
/// name occurs in the instruction.
pub fn object_id_for_instructions(instructions: &str) -> Option<&'static str> {
    let first_line = instructions.lines().next().unwrap_or_default();

    for class in OBJECT_CLASSES {
        if class.names.iter().any(|name| first_line.contains(name)) {
            return Some(class.id);
        }
    }

    None
}

/// Locales whose audio challenges are served in the widget's own language.
pub const ORIGINAL_LANGUAGE_AUDIO: &[&str] = &["de", "es", "fr", "nl"];

/// Recognition language for an audio challenge. Audio is served in the
/// widget's own language only for the [`ORIGINAL_LANGUAGE_AUDIO`] locales;
/// every other widget receives English audio regardless of its `hl`
/// parameter.
pub fn audio_language(locale: &str) -> &'static str {
    let base = locale.split(['-', '_']).next().unwrap_or_default();

    if ORIGINAL_LANGUAGE_AUDIO.contains(&base) {
        speech_language(base)
    } else {
        "en-US"
    }
}

/// Map a widget locale (`hl` query parameter) to the language hint the
/// speech backend expects, falling back to US English.
pub fn speech_language(locale: &str) -> &'static str {
    let base = locale.split(['-', '_']).next().unwrap_or_default();

    match base {
        "en" => "en-US",
        "de" => "de-DE",
        "es" => "es-ES",
        "fr" => "fr-FR",
        "nl" => "nl-NL",
        "ru" => "ru-RU",
        "pt" => "pt-BR",
        "it" => "it-IT",
        "ko" => "ko-KR",
        "ja" => "ja-JP",
        "zh" => "zh-CN",
        _ => "en-US",
    }
}
